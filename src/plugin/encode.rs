use super::{EncodePlugin, Plugin};
use crate::analyzer::ProbeData;
use crate::data::Video;
use crate::encoder::FfmpegCommand;

/// Constant quality used by every built-in encode
const CRF: u8 = 23;

/// H.264 in MP4 at the source frame size and rate.
///
/// Earlier twitch-dl releases also forced 30 fps here; that resampling now
/// lives only in `mp4-30fps`, so pick that plugin to keep the old output.
pub struct Mp4Libx264Plugin;

impl Plugin for Mp4Libx264Plugin {
    fn name(&self) -> &str {
        "mp4-libx264"
    }
}

impl EncodePlugin for Mp4Libx264Plugin {
    fn extension(&self) -> &str {
        "mp4"
    }

    fn apply(&self, cmd: FfmpegCommand, probe: &ProbeData, _video: &Video) -> FfmpegCommand {
        h264(cmd, probe)
    }
}

/// H.264 in MP4 resampled to 30 fps
pub struct Mp430FpsPlugin;

impl Plugin for Mp430FpsPlugin {
    fn name(&self) -> &str {
        "mp4-30fps"
    }
}

impl EncodePlugin for Mp430FpsPlugin {
    fn extension(&self) -> &str {
        "mp4"
    }

    fn apply(&self, cmd: FfmpegCommand, probe: &ProbeData, _video: &Video) -> FfmpegCommand {
        h264(cmd.fps(30), probe)
    }
}

/// VP8 in WebM at 30 fps
pub struct WebmVp8Plugin;

impl Plugin for WebmVp8Plugin {
    fn name(&self) -> &str {
        "webm-vp8"
    }
}

impl EncodePlugin for WebmVp8Plugin {
    fn extension(&self) -> &str {
        "webm"
    }

    fn apply(&self, cmd: FfmpegCommand, probe: &ProbeData, _video: &Video) -> FfmpegCommand {
        // WebM cannot carry the AAC audio Twitch streams use
        cmd.video_codec("libvpx")
            .size(probe.frame_size())
            .fps(30)
            .crf(CRF)
            .output_option("-b:v 0")
            .audio_codec("libvorbis")
    }
}

fn h264(cmd: FfmpegCommand, probe: &ProbeData) -> FfmpegCommand {
    cmd.video_codec("libx264")
        .size(probe.frame_size())
        .crf(CRF)
        .audio_codec("copy")
        .output_option("-bsf:a aac_adtstoasc")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ffprobe::parse_probe_output;
    use crate::data::tests::sample_video;

    fn probe() -> ProbeData {
        parse_probe_output(
            r#"{"streams": [{"codec_type": "video", "width": 1280, "height": 720}]}"#,
        )
        .unwrap()
    }

    fn args(plugin: &dyn EncodePlugin) -> Vec<String> {
        plugin
            .apply(FfmpegCommand::new("in.flv", "out"), &probe(), &sample_video())
            .output_args()
            .to_vec()
    }

    #[test]
    fn test_mp4_keeps_source_rate() {
        let args = args(&Mp4Libx264Plugin);
        assert_eq!(
            args,
            [
                "-c:v", "libx264", "-s", "1280x720", "-crf", "23", "-c:a", "copy", "-bsf:a",
                "aac_adtstoasc"
            ]
        );
    }

    #[test]
    fn test_mp4_30fps_sets_rate() {
        let args = args(&Mp430FpsPlugin);
        assert_eq!(&args[..2], ["-r", "30"]);
        assert!(args.contains(&"libx264".to_string()));
    }

    #[test]
    fn test_webm_uses_vp8_and_vorbis() {
        let args = args(&WebmVp8Plugin);
        assert!(args.windows(2).any(|w| w == ["-c:v", "libvpx"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "libvorbis"]));
        assert!(args.windows(2).any(|w| w == ["-r", "30"]));
        assert_eq!(WebmVp8Plugin.extension(), "webm");
    }
}
