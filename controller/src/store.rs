use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::sync::Mutex;

use climate_common::{RuntimeConfig, Thresholds};

/// JSON file persistence for the runtime configuration.
#[derive(Clone)]
pub struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn new() -> Self {
        let data_dir = std::env::var("CLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.climate"));
        Self::at(data_dir)
    }

    pub fn at(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        self.read_runtime().await
    }

    #[cfg(test)]
    pub async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        self.write_runtime(runtime).await
    }

    /// Rewrites only the thresholds section; returns once the file is in place.
    ///
    /// A file that exists but cannot be read is left untouched and reported,
    /// so the other sections are never replaced by defaults.
    pub async fn save_thresholds(&self, thresholds: &Thresholds) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut runtime = self.read_runtime().await?;
        runtime.thresholds = *thresholds;
        self.write_runtime(&runtime).await
    }

    async fn read_runtime(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("malformed {}", self.runtime_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_runtime(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, payload)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}
