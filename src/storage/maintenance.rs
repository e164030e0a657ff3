//! Background storage maintenance
//!
//! Retention sweeps and partition upkeep run in their own tasks, outside of
//! request handling. A failing or panicking pass is logged and the loop
//! carries on with the next tick.

use super::EventStore;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

#[derive(Debug, Clone, Copy)]
pub struct MaintenanceConfig {
    /// How often to check stored volume against capacity
    pub retention_interval: Duration,

    /// How often to register upcoming partitions
    pub partition_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            retention_interval: Duration::from_secs(300),
            partition_interval: Duration::from_secs(3600),
        }
    }
}

/// Handles of the running maintenance tasks
pub struct MaintenanceTasks {
    pub retention: Option<JoinHandle<()>>,
    pub partitions: JoinHandle<()>,
}

impl MaintenanceTasks {
    pub fn abort(&self) {
        if let Some(retention) = &self.retention {
            retention.abort();
        }
        self.partitions.abort();
    }
}

/// Start all maintenance tasks.
///
/// A `disk_capacity_gb` of zero or less means unlimited retention: no sweep
/// task is started.
pub fn start_maintenance(
    store: Arc<dyn EventStore>,
    disk_capacity_gb: i64,
    config: MaintenanceConfig,
) -> MaintenanceTasks {
    let retention = if disk_capacity_gb <= 0 {
        tracing::info!(
            "Disk capacity is set to 0 or negative - older data will not be automatically removed"
        );
        None
    } else {
        Some(spawn_retention_task(
            store.clone(),
            disk_capacity_gb as u64,
            config.retention_interval,
        ))
    };

    let partitions = spawn_partition_task(store, config.partition_interval);

    MaintenanceTasks {
        retention,
        partitions,
    }
}

pub fn spawn_retention_task(
    store: Arc<dyn EventStore>,
    capacity_gb: u64,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(capacity_gb, "Retention sweep started");
        run_every(interval, "retention sweep", || {
            let store = store.clone();
            async move {
                match store.sweep_retention(capacity_gb).await {
                    Ok(stats) if !stats.partitions_dropped.is_empty() => {
                        tracing::info!(
                            partitions = ?stats.partitions_dropped,
                            rows_deleted = stats.rows_deleted,
                            used_bytes_before = stats.used_bytes_before,
                            used_bytes_after = stats.used_bytes_after,
                            "Retention sweep freed space"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Retention sweep failed"),
                }
            }
        })
        .await;
    })
}

pub fn spawn_partition_task(store: Arc<dyn EventStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_every(interval, "partition maintenance", || {
            let store = store.clone();
            async move {
                match store.maintain_partitions().await {
                    Ok(created) if created > 0 => {
                        tracing::info!(created, "Registered new partitions");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Partition maintenance failed"),
                }
            }
        })
        .await;
    })
}

async fn run_every<F, Fut>(period: Duration, name: &'static str, mut pass: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if let Err(panic) = AssertUnwindSafe(pass()).catch_unwind().await {
            tracing::error!(task = name, panic = ?panic, "Maintenance pass panicked");
        }
    }
}
