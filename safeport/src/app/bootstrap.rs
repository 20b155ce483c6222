//! Application bootstrap implementation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::AppError;
use crate::config::PlacementConfig;
use crate::coord::BlockPos;
use crate::identity::RequesterId;
use crate::loader::RegionLoader;
use crate::maintenance::MaintenanceDaemon;
use crate::manager::{PlacementHandle, RequestManager, ShutdownReport, SubmitError};
use crate::monitor::{DefaultPerformanceMonitor, NoopMonitor, PerformanceMonitor};
use crate::options::SearchOptions;
use crate::search::SpiralSearch;
use crate::validator::SafetyValidator;
use crate::world::WorldProvider;

/// The placement core with every engine wired and maintenance running.
///
/// Services are started in order:
/// 1. Region loader over the host world
/// 2. Spiral search and safety validator sharing the loader
/// 3. Performance monitor (no-op when monitoring is disabled)
/// 4. Request manager
/// 5. Maintenance daemon
pub struct PlacementApp {
    config: PlacementConfig,
    defaults: SearchOptions,
    loader: RegionLoader,
    search: Arc<SpiralSearch>,
    validator: Arc<SafetyValidator>,
    monitor: Arc<dyn PerformanceMonitor>,
    manager: RequestManager,
    maintenance_shutdown: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl PlacementApp {
    /// Validates `config` and starts every engine.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the default search options
    /// are invalid.
    pub async fn start(
        config: PlacementConfig,
        world: Arc<dyn WorldProvider>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let defaults = config.defaults.to_options()?;

        let loader = RegionLoader::new(world, config.loader.clone());
        let search = Arc::new(SpiralSearch::new(loader.clone(), config.search.clone()));
        let validator = Arc::new(SafetyValidator::new(
            loader.clone(),
            config.validator.clone(),
        ));
        let monitor: Arc<dyn PerformanceMonitor> = if config.monitor.enabled {
            Arc::new(DefaultPerformanceMonitor::new(config.monitor.clone()))
        } else {
            Arc::new(NoopMonitor)
        };
        let manager = RequestManager::new(
            loader.clone(),
            Arc::clone(&search),
            Arc::clone(&validator),
            Arc::clone(&monitor),
            config.manager.clone(),
        );

        let maintenance_shutdown = CancellationToken::new();
        let daemon = MaintenanceDaemon::new(
            loader.clone(),
            Arc::clone(&monitor),
            config.maintenance.interval,
        );
        let maintenance = tokio::spawn(daemon.run(maintenance_shutdown.clone()));

        info!(
            max_concurrent = config.manager.max_concurrent,
            max_concurrent_loads = config.loader.max_concurrent_loads,
            monitoring = monitor.is_enabled(),
            "Placement core started"
        );

        Ok(Self {
            config,
            defaults,
            loader,
            search,
            validator,
            monitor,
            manager,
            maintenance_shutdown,
            maintenance: Mutex::new(Some(maintenance)),
        })
    }

    /// Submits a request using the configured default options.
    pub fn submit(
        &self,
        requester: RequesterId,
        center: BlockPos,
    ) -> Result<PlacementHandle, SubmitError> {
        self.manager.submit(requester, center, self.defaults.clone())
    }

    /// Settings the app was started with.
    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Default search options.
    pub fn default_options(&self) -> &SearchOptions {
        &self.defaults
    }

    /// The request manager.
    pub fn manager(&self) -> &RequestManager {
        &self.manager
    }

    /// The region loader.
    pub fn loader(&self) -> &RegionLoader {
        &self.loader
    }

    /// The candidate generator.
    pub fn search(&self) -> &Arc<SpiralSearch> {
        &self.search
    }

    /// The safety validator.
    pub fn validator(&self) -> &Arc<SafetyValidator> {
        &self.validator
    }

    /// The performance monitor.
    pub fn monitor(&self) -> &Arc<dyn PerformanceMonitor> {
        &self.monitor
    }

    /// Shuts the manager down, then stops maintenance.
    ///
    /// Safe to call more than once; later calls find nothing left to stop.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let report = self.manager.shutdown(timeout).await;

        self.maintenance_shutdown.cancel();
        let handle = self.maintenance.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Maintenance daemon ended abnormally");
            }
        }

        info!(
            drained = report.drained,
            aborted = report.aborted,
            "Placement core stopped"
        );
        report
    }
}

impl std::fmt::Debug for PlacementApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacementApp")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::world::synthetic::SyntheticWorld;

    fn world() -> Arc<dyn WorldProvider> {
        Arc::new(SyntheticWorld::flat(64))
    }

    #[tokio::test]
    async fn test_start_and_place() {
        let config = PlacementConfig::default()
            .with_radius(20, 60)
            .with_seed(3);
        let app = PlacementApp::start(config, world()).await.unwrap();

        let result = app
            .submit(RequesterId::random(), BlockPos::new(0, 64, 0))
            .unwrap()
            .await;
        assert!(result.is_success(), "{result:?}");
        assert_eq!(app.monitor().stats().successes, 1);

        let report = app.shutdown(Duration::from_secs(1)).await;
        assert!(report.drained);
        assert!(!app.manager().is_accepting());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = PlacementConfig::default().with_max_concurrent(0);
        let err = PlacementApp::start(config, world()).await.unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::Zero(_))));
    }

    #[tokio::test]
    async fn test_disabled_monitoring_uses_noop() {
        let config = PlacementConfig::default().with_monitoring(false);
        let app = PlacementApp::start(config, world()).await.unwrap();
        assert!(!app.monitor().is_enabled());
        app.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let app = PlacementApp::start(PlacementConfig::default(), world())
            .await
            .unwrap();
        app.shutdown(Duration::from_secs(1)).await;
        let second = app.shutdown(Duration::from_secs(1)).await;
        assert_eq!(second.cancelled, 0);
    }
}
