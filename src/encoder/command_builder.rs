use std::path::{Path, PathBuf};

/// FFmpeg command line under construction.
///
/// Encode plugins add output options; the launcher owns the input, the
/// output and the flags that keep `-stats` progress on stderr.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Add one output argument
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add a whitespace separated option string such as `-crf 23`
    pub fn output_option(mut self, option: &str) -> Self {
        self.output_args
            .extend(option.split_whitespace().map(str::to_string));
        self
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Frame size as `WxH`
    pub fn size(self, size: impl Into<String>) -> Self {
        self.output_arg("-s").output_arg(size)
    }

    pub fn fps(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn output_args(&self) -> &[String] {
        &self.output_args
    }

    /// Build FFmpeg arguments
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-nostdin".to_string(),
            "-hide_banner".to_string(),
            "-stats".to_string(),
            "-i".to_string(),
            self.input.to_string_lossy().into_owned(),
        ];

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}
