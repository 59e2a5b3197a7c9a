use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            anyhow::bail!("config must declare at least one detection model");
        }
        for model in &self.models {
            if model.classes.is_empty() {
                anyhow::bail!("model '{}' declares no classes", model.name);
            }
        }
        if self.detection.cooldown_sec < 0.0 {
            anyhow::bail!("detection.cooldown_sec must be non-negative");
        }
        if self.video.fps <= 0.0 {
            anyhow::bail!("video.fps must be positive");
        }
        for (class, fine) in &self.fines {
            if *fine < 0 {
                anyhow::bail!("fine for '{}' must be non-negative", class);
            }
        }
        Ok(())
    }
}
