use std::sync::Arc;

/// Channel-level settings.
#[derive(Clone)]
pub struct ChannelConfig {
    /// Durable mirror for the history. `None` keeps history in memory only.
    pub db: Option<Arc<sled::Db>>,
    /// Replay restored history through validation before trusting it.
    pub revalidate_on_restore: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            db: None,
            revalidate_on_restore: true,
        }
    }
}

impl ChannelConfig {
    pub fn persistent(db: Arc<sled::Db>) -> Self {
        Self {
            db: Some(db),
            ..Self::default()
        }
    }
}
