//! Startup environment check for the model backend

use anyhow::{bail, Context};
use async_trait::async_trait;
use parley_config::InstallConfig;
use parley_llm::{LLMProvider, OllamaProvider};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

const OLLAMA_DOWNLOAD_URL: &str = "https://ollama.com/download";

/// Something the backend needs before it can serve requests
#[async_trait]
pub trait Environment: Send + Sync {
    fn name(&self) -> &str;

    /// True when everything is already in place
    async fn verify(&self) -> bool;

    /// Bring the environment into a usable state
    async fn install(&self) -> anyhow::Result<()>;
}

/// Local Ollama runtime plus the configured model
pub struct OllamaEnvironment {
    provider: Arc<OllamaProvider>,
    binary: String,
}

impl OllamaEnvironment {
    pub fn new(provider: Arc<OllamaProvider>) -> Self {
        Self {
            provider,
            binary: "ollama".to_string(),
        }
    }

    async fn binary_available(&self) -> bool {
        match Command::new(&self.binary).arg("--version").output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!(version = %version.trim(), "Found ollama");
                true
            }
            Ok(output) => {
                warn!(status = %output.status, "ollama --version failed");
                false
            }
            Err(e) => {
                warn!("ollama binary not found: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Environment for OllamaEnvironment {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn verify(&self) -> bool {
        if !self.binary_available().await {
            return false;
        }

        match self.provider.validate().await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    base_url = %self.provider.base_url(),
                    model = %self.provider.model(),
                    "Backend not ready: {}",
                    e
                );
                false
            }
        }
    }

    async fn install(&self) -> anyhow::Result<()> {
        if !self.binary_available().await {
            bail!(
                "ollama is not installed; download it from {} and start it with `ollama serve`",
                OLLAMA_DOWNLOAD_URL
            );
        }

        self.provider
            .pull_model()
            .await
            .with_context(|| format!("failed to pull model '{}'", self.provider.model()))
    }
}

/// What the startup check ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Verification passed
    Ready,
    /// Verification failed and install succeeded
    Installed,
    /// Verification failed and install was not requested; serving anyway
    Degraded,
    /// Check disabled
    Skipped,
}

/// Run the startup check.
///
/// `force_install` installs on a failed check even when the config does not
/// ask for it. An install failure is returned as an error.
pub async fn gate(
    env: &dyn Environment,
    config: &InstallConfig,
    force_install: bool,
) -> anyhow::Result<GateOutcome> {
    if !config.check_on_startup && !force_install {
        return Ok(GateOutcome::Skipped);
    }

    if env.verify().await {
        info!(environment = env.name(), "Environment ready");
        return Ok(GateOutcome::Ready);
    }

    if config.auto_install || force_install {
        info!(environment = env.name(), "Installing");
        env.install()
            .await
            .with_context(|| format!("{} install failed", env.name()))?;
        return Ok(GateOutcome::Installed);
    }

    warn!(
        environment = env.name(),
        "Environment not ready; requests may fail until it is (run with --install to fix)"
    );
    Ok(GateOutcome::Degraded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEnvironment {
        ready: bool,
        install_fails: bool,
        installs: AtomicUsize,
    }

    impl FakeEnvironment {
        fn new(ready: bool, install_fails: bool) -> Self {
            Self {
                ready,
                install_fails,
                installs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Environment for FakeEnvironment {
        fn name(&self) -> &str {
            "fake"
        }

        async fn verify(&self) -> bool {
            self.ready
        }

        async fn install(&self) -> anyhow::Result<()> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            if self.install_fails {
                bail!("no network");
            }
            Ok(())
        }
    }

    fn install_config(check_on_startup: bool, auto_install: bool) -> InstallConfig {
        InstallConfig {
            check_on_startup,
            auto_install,
        }
    }

    #[tokio::test]
    async fn test_ready_environment() {
        let env = FakeEnvironment::new(true, false);
        let outcome = gate(&env, &install_config(true, true), false).await.unwrap();
        assert_eq!(outcome, GateOutcome::Ready);
        assert_eq!(env.installs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_check_disabled() {
        let env = FakeEnvironment::new(false, false);
        let outcome = gate(&env, &install_config(false, true), false).await.unwrap();
        assert_eq!(outcome, GateOutcome::Skipped);
        assert_eq!(env.installs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_without_install_continues() {
        let env = FakeEnvironment::new(false, false);
        let outcome = gate(&env, &install_config(true, false), false).await.unwrap();
        assert_eq!(outcome, GateOutcome::Degraded);
        assert_eq!(env.installs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_install() {
        let env = FakeEnvironment::new(false, false);
        let outcome = gate(&env, &install_config(true, true), false).await.unwrap();
        assert_eq!(outcome, GateOutcome::Installed);
        assert_eq!(env.installs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forced_install_overrides_config() {
        let env = FakeEnvironment::new(false, false);
        let outcome = gate(&env, &install_config(false, false), true).await.unwrap();
        assert_eq!(outcome, GateOutcome::Installed);
    }

    #[tokio::test]
    async fn test_install_failure_is_an_error() {
        let env = FakeEnvironment::new(false, true);
        let err = gate(&env, &install_config(true, true), false).await.unwrap_err();
        assert!(format!("{:#}", err).contains("no network"));
    }
}
