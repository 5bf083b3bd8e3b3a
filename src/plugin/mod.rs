//! Filename and encode strategies
//!
//! Plugins are registered once at start-up, loaded, and then frozen in a
//! [`PluginRegistry`]. Context plugins propose output filenames; encode
//! plugins configure an ffmpeg command line.

pub mod context;
pub mod encode;

pub use context::GenericPlugin;
pub use encode::{Mp4Libx264Plugin, Mp430FpsPlugin, WebmVp8Plugin};

use crate::analyzer::ProbeData;
use crate::data::Video;
use crate::encoder::FfmpegCommand;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use futures::future::join_all;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Behaviour shared by every plugin
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Higher wins when several plugins could answer
    fn priority(&self) -> i32 {
        0
    }

    /// One-time initialization, called before the registry is frozen
    fn load(&mut self) -> AppResult<()> {
        Ok(())
    }
}

/// Proposes output filenames for a video
#[async_trait]
pub trait ContextPlugin: Plugin {
    /// Base name without extension, or `None` when the plugin has no opinion
    async fn suggest_filename(&self, video: &Video) -> Option<String>;
}

/// Configures the codec and format of an encode
pub trait EncodePlugin: Plugin {
    /// Extension of the files this plugin produces, without the dot
    fn extension(&self) -> &str;

    /// Add codec settings. Input and output are already set on `cmd`.
    fn apply(&self, cmd: FfmpegCommand, probe: &ProbeData, video: &Video) -> FfmpegCommand;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Context,
    Encode,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Context => "context",
            Capability::Encode => "encode",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "context" => Ok(Capability::Context),
            "encode" => Ok(Capability::Encode),
            other => Err(AppError::InvalidSelector(format!("unknown capability '{}'", other))),
        }
    }
}

/// A registered plugin, tagged by what it can do
#[derive(Clone)]
pub enum Strategy {
    Context(Arc<dyn ContextPlugin>),
    Encode(Arc<dyn EncodePlugin>),
}

impl Strategy {
    pub fn name(&self) -> &str {
        match self {
            Strategy::Context(p) => p.name(),
            Strategy::Encode(p) => p.name(),
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            Strategy::Context(p) => p.priority(),
            Strategy::Encode(p) => p.priority(),
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Strategy::Context(_) => Capability::Context,
            Strategy::Encode(_) => Capability::Encode,
        }
    }

    /// Type string, as used by `type:` selectors
    pub fn kind(&self) -> &'static str {
        self.capability().as_str()
    }

    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::All => true,
            Selector::Type(kind) => self.kind() == kind.as_str(),
            Selector::Capability(capability) => self.capability() == *capability,
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("priority", &self.priority())
            .finish()
    }
}

/// Which plugins a query is about.
///
/// Parses from `all`, `*`, `<type>`, `type:<type>` and
/// `capability:<context|encode>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    Type(String),
    Capability(Capability),
}

impl FromStr for Selector {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "all" || s == "*" {
            return Ok(Selector::All);
        }

        match s.split_once(':') {
            Some(("type", kind)) if is_word(kind) => Ok(Selector::Type(kind.to_string())),
            Some(("capability", capability)) => Ok(Selector::Capability(capability.parse()?)),
            None if is_word(s) => Ok(Selector::Type(s.to_string())),
            _ => Err(AppError::InvalidSelector(s.to_string())),
        }
    }
}

fn is_word(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A filename proposal and the plugin that made it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub plugin: String,
    pub priority: i32,
    pub filename: String,
}

enum Pending {
    Context(Box<dyn ContextPlugin>),
    Encode(Box<dyn EncodePlugin>),
}

/// Registration list, in the order plugins were added
#[derive(Default)]
pub struct RegistryBuilder {
    pending: Vec<Pending>,
}

impl RegistryBuilder {
    pub fn context(mut self, plugin: impl ContextPlugin + 'static) -> Self {
        self.pending.push(Pending::Context(Box::new(plugin)));
        self
    }

    pub fn encode(mut self, plugin: impl EncodePlugin + 'static) -> Self {
        self.pending.push(Pending::Encode(Box::new(plugin)));
        self
    }

    /// Load every plugin once and freeze the registry
    pub fn load(self) -> AppResult<PluginRegistry> {
        let mut strategies = Vec::with_capacity(self.pending.len());

        for pending in self.pending {
            let strategy = match pending {
                Pending::Context(mut plugin) => {
                    plugin.load()?;
                    Strategy::Context(Arc::from(plugin))
                }
                Pending::Encode(mut plugin) => {
                    plugin.load()?;
                    Strategy::Encode(Arc::from(plugin))
                }
            };
            debug!(
                "Loaded {} plugin '{}' (priority {})",
                strategy.kind(),
                strategy.name(),
                strategy.priority()
            );
            strategies.push(strategy);
        }

        info!("{} plugins loaded", strategies.len());
        Ok(PluginRegistry { strategies })
    }
}

/// Immutable set of loaded plugins
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    strategies: Vec<Strategy>,
}

impl PluginRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with the plugins that ship with the program
    pub fn builtin() -> AppResult<Self> {
        Self::builder()
            .context(GenericPlugin)
            .encode(Mp4Libx264Plugin)
            .encode(Mp430FpsPlugin)
            .encode(WebmVp8Plugin)
            .load()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Plugins matching `selector`, in registration order
    pub fn all(&self, selector: &Selector) -> Vec<&Strategy> {
        self.strategies
            .iter()
            .filter(|s| s.matches(selector))
            .collect()
    }

    /// Highest priority plugin matching `selector`; ties go to the one
    /// registered first
    pub fn first(&self, selector: &Selector) -> Option<&Strategy> {
        self.all(selector)
            .into_iter()
            .fold(None, |best: Option<&Strategy>, candidate| match best {
                Some(best) if best.priority() >= candidate.priority() => Some(best),
                _ => Some(candidate),
            })
    }

    pub fn context_plugins(&self) -> Vec<Arc<dyn ContextPlugin>> {
        self.strategies
            .iter()
            .filter_map(|s| match s {
                Strategy::Context(p) => Some(p.clone()),
                Strategy::Encode(_) => None,
            })
            .collect()
    }

    pub fn encode_plugin(&self, name: &str) -> AppResult<Arc<dyn EncodePlugin>> {
        self.strategies
            .iter()
            .find_map(|s| match s {
                Strategy::Encode(p) if p.name() == name => Some(p.clone()),
                _ => None,
            })
            .ok_or_else(|| AppError::UnknownEncodePlugin(name.to_string()))
    }

    /// Ask every context plugin at once and keep the answer of the highest
    /// priority plugin that had one
    pub async fn suggest_filename(&self, video: &Video) -> Option<Suggestion> {
        let plugins = self.context_plugins();
        let answers = join_all(plugins.iter().map(|p| p.suggest_filename(video))).await;

        plugins
            .iter()
            .zip(answers)
            .filter_map(|(plugin, answer)| {
                let filename = answer.filter(|f| !f.trim().is_empty())?;
                Some(Suggestion {
                    plugin: plugin.name().to_string(),
                    priority: plugin.priority(),
                    filename,
                })
            })
            .fold(None, |best: Option<Suggestion>, candidate| match best {
                Some(best) if best.priority >= candidate.priority => Some(best),
                _ => Some(candidate),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::sample_video;
    use std::time::Duration;

    struct Fixed {
        name: &'static str,
        priority: i32,
        delay_ms: u64,
        answer: Option<&'static str>,
    }

    impl Plugin for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    #[async_trait]
    impl ContextPlugin for Fixed {
        async fn suggest_filename(&self, _video: &Video) -> Option<String> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.answer.map(str::to_string)
        }
    }

    fn fixed(
        name: &'static str,
        priority: i32,
        delay_ms: u64,
        answer: Option<&'static str>,
    ) -> Fixed {
        Fixed {
            name,
            priority,
            delay_ms,
            answer,
        }
    }

    /// Answers only after `load` has run
    #[derive(Default)]
    struct NeedsLoad {
        loaded: bool,
    }

    impl Plugin for NeedsLoad {
        fn name(&self) -> &str {
            "needs-load"
        }

        fn load(&mut self) -> AppResult<()> {
            self.loaded = true;
            Ok(())
        }
    }

    #[async_trait]
    impl ContextPlugin for NeedsLoad {
        async fn suggest_filename(&self, _video: &Video) -> Option<String> {
            self.loaded.then(|| "loaded".to_string())
        }
    }

    #[tokio::test]
    async fn test_highest_priority_answer_wins() {
        // The winner answers last
        let registry = PluginRegistry::builder()
            .context(fixed("a", 5, 10, Some("from-a")))
            .context(fixed("b", 10, 60, Some("from-b")))
            .context(fixed("c", 1, 0, Some("from-c")))
            .load()
            .unwrap();

        let suggestion = registry.suggest_filename(&sample_video()).await.unwrap();
        assert_eq!(suggestion.filename, "from-b");
        assert_eq!(suggestion.plugin, "b");
        assert_eq!(suggestion.priority, 10);
    }

    #[tokio::test]
    async fn test_plugins_without_answer_are_skipped() {
        // c answers well before a
        let registry = PluginRegistry::builder()
            .context(fixed("a", 5, 50, Some("from-a")))
            .context(fixed("b", 10, 10, None))
            .context(fixed("c", 1, 0, Some("from-c")))
            .context(fixed("d", 20, 0, Some("  ")))
            .load()
            .unwrap();

        let suggestion = registry.suggest_filename(&sample_video()).await.unwrap();
        assert_eq!(suggestion.filename, "from-a");
        assert_eq!(suggestion.plugin, "a");

        let silent = PluginRegistry::builder()
            .context(fixed("b", 10, 0, None))
            .load()
            .unwrap();
        assert_eq!(silent.suggest_filename(&sample_video()).await, None);
    }

    #[tokio::test]
    async fn test_priority_tie_goes_to_first_registered() {
        let registry = PluginRegistry::builder()
            .context(fixed("first", 3, 30, Some("first")))
            .context(fixed("second", 3, 0, Some("second")))
            .load()
            .unwrap();

        let suggestion = registry.suggest_filename(&sample_video()).await.unwrap();
        assert_eq!(suggestion.plugin, "first");
    }

    #[tokio::test]
    async fn test_load_runs_before_use() {
        let registry = PluginRegistry::builder()
            .context(NeedsLoad::default())
            .load()
            .unwrap();

        let suggestion = registry.suggest_filename(&sample_video()).await.unwrap();
        assert_eq!(suggestion.filename, "loaded");
    }

    #[test]
    fn test_builtin_selection() {
        let registry = PluginRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 4);

        let first = registry.first(&"encode".parse().unwrap()).unwrap();
        assert_eq!(first.name(), "mp4-libx264");

        let context = registry.first(&Selector::Capability(Capability::Context)).unwrap();
        assert_eq!(context.name(), "generic");
        assert_eq!(context.priority(), -10);

        let encodes: Vec<_> = registry
            .all(&Selector::Type("encode".to_string()))
            .into_iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(encodes, vec!["mp4-libx264", "mp4-30fps", "webm-vp8"]);

        assert_eq!(registry.all(&Selector::All).len(), 4);
        assert!(registry.all(&Selector::Type("nope".to_string())).is_empty());
        assert!(registry.first(&Selector::Type("nope".to_string())).is_none());
    }

    #[test]
    fn test_encode_plugin_lookup() {
        let registry = PluginRegistry::builtin().unwrap();
        assert_eq!(registry.encode_plugin("webm-vp8").unwrap().extension(), "webm");
        assert!(matches!(
            registry.encode_plugin("generic"),
            Err(AppError::UnknownEncodePlugin(name)) if name == "generic"
        ));
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!("all".parse::<Selector>().unwrap(), Selector::All);
        assert_eq!("*".parse::<Selector>().unwrap(), Selector::All);
        assert_eq!(
            "type:context".parse::<Selector>().unwrap(),
            Selector::Type("context".to_string())
        );
        assert_eq!(
            "capability:encode".parse::<Selector>().unwrap(),
            Selector::Capability(Capability::Encode)
        );

        for bad in ["", "type:", "capability:fly", "color:red", "two words"] {
            assert!(
                matches!(bad.parse::<Selector>(), Err(AppError::InvalidSelector(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
