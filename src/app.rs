use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use jobrunner_core::{
    config::{AppConfig, DatabaseConfig},
    traits::Store,
};
use jobrunner_dispatcher::{
    DispatchBroadcaster, HealthMonitor, NotificationSettings, RandomStrategy, RescheduleEngine,
    RunLifecycleHandler,
};
use jobrunner_infrastructure::{InfrastructureFactory, MetricsCollector, PostgresStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{sync::broadcast, time::Instant};
use tracing::{error, info};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行分发广播
    Broadcaster,
    /// 仅运行健康检查
    HealthCheck,
    /// 运行所有组件
    All,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    broadcaster: Arc<DispatchBroadcaster>,
    monitor: Arc<HealthMonitor>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let tz = config.scheduling.tz()?;
        let store = create_store(&config.database).await?;
        let publisher = InfrastructureFactory::create_publisher(&config.message_queue)
            .await
            .context("创建消息发布器失败")?;
        let notifier = InfrastructureFactory::create_notifier(&config.notification)
            .context("创建通知器失败")?;

        if config.observability.metrics_enabled {
            install_metrics_exporter(&config.observability.metrics_bind_address)?;
        }
        let metrics = Arc::new(MetricsCollector::new());

        let lifecycle = Arc::new(RunLifecycleHandler::new(
            RescheduleEngine::new(tz, Arc::clone(&metrics)),
            NotificationSettings::new(
                config.notification.admin_emails.clone(),
                config.notification.resolved_hostname(),
            ),
            Arc::clone(&metrics),
        ));

        let broadcaster = Arc::new(DispatchBroadcaster::new(
            Arc::clone(&store),
            Arc::clone(&publisher),
            Arc::new(RandomStrategy::new()),
            Arc::clone(&metrics),
            config.message_queue.channel_prefix.clone(),
        ));

        let monitor = Arc::new(HealthMonitor::new(
            store,
            publisher,
            notifier,
            lifecycle,
            metrics,
            config.message_queue.event_channel.clone(),
            config.worker_ping.unresponsive_threshold(),
        ));

        Ok(Self {
            config,
            mode,
            broadcaster,
            monitor,
        })
    }

    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        match self.mode {
            AppMode::Broadcaster => self.run_broadcaster(shutdown_rx).await,
            AppMode::HealthCheck => self.run_health_check(shutdown_rx).await,
            AppMode::All => self.run_all_components(shutdown_rx).await,
        }

        info!("应用程序已停止");
        Ok(())
    }

    async fn run_broadcaster(&self, shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动分发广播，轮询间隔 {} 秒，ping间隔 {} 秒",
            self.config.dispatcher.poll_interval_seconds, self.config.worker_ping.interval_seconds
        );
        run_broadcaster_loop(
            Arc::clone(&self.broadcaster),
            Duration::from_secs(self.config.dispatcher.poll_interval_seconds),
            Duration::from_secs(self.config.worker_ping.interval_seconds),
            shutdown_rx,
        )
        .await;
    }

    async fn run_health_check(&self, shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动健康检查，间隔 {} 秒",
            self.config.health_check.interval_seconds
        );
        run_health_check_loop(
            Arc::clone(&self.monitor),
            Duration::from_secs(self.config.health_check.interval_seconds),
            shutdown_rx,
        )
        .await;
    }

    async fn run_all_components(&self, shutdown_rx: broadcast::Receiver<()>) {
        info!("启动所有组件");

        let mut handles = Vec::new();

        if self.config.dispatcher.enabled {
            let broadcaster = Arc::clone(&self.broadcaster);
            let poll = Duration::from_secs(self.config.dispatcher.poll_interval_seconds);
            let ping = Duration::from_secs(self.config.worker_ping.interval_seconds);
            let shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                run_broadcaster_loop(broadcaster, poll, ping, shutdown_rx).await;
            }));
        }

        if self.config.health_check.enabled {
            let monitor = Arc::clone(&self.monitor);
            let interval = Duration::from_secs(self.config.health_check.interval_seconds);
            let shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                run_health_check_loop(monitor, interval, shutdown_rx).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("组件任务异常退出: {}", e);
            }
        }
    }
}

/// 按配置创建存储，PostgreSQL存储按需执行迁移
async fn create_store(config: &DatabaseConfig) -> Result<Arc<dyn Store>> {
    if config.is_in_memory() || !config.run_migrations {
        return InfrastructureFactory::create_store(config)
            .await
            .context("创建存储失败");
    }

    info!("连接数据库: {}", mask_database_url(&config.url));
    let store = PostgresStore::connect(config)
        .await
        .context("连接数据库失败")?;

    sqlx::migrate!("./migrations")
        .run(store.pool())
        .await
        .context("运行数据库迁移失败")?;

    info!("数据库连接成功");
    Ok(Arc::new(store))
}

fn install_metrics_exporter(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("启动Prometheus指标导出器失败")?;

    info!("Prometheus指标导出器监听 http://{}", addr);
    Ok(())
}

/// 分发循环，每次tick扫描一次，ping按自己的间隔附带发送
async fn run_broadcaster_loop(
    broadcaster: Arc<DispatchBroadcaster>,
    poll_interval: Duration,
    ping_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(poll_interval);
    let mut next_ping = Instant::now();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let send_pings = Instant::now() >= next_ping;
                if send_pings {
                    next_ping = Instant::now() + ping_interval;
                }
                if let Err(e) = broadcaster.sweep(Utc::now(), send_pings).await {
                    error!("分发扫描失败: {}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!("分发循环收到关闭信号");
                break;
            }
        }
    }
}

async fn run_health_check_loop(
    monitor: Arc<HealthMonitor>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match monitor.check(Utc::now()).await {
                    Ok(report) if !report.failed_run_ids.is_empty() => {
                        info!(
                            "健康检查: {} 个无响应Worker，{} 个运行实例被标记为失败",
                            report.unresponsive_workers.len(),
                            report.failed_run_ids.len()
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!("健康检查失败: {}", e),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("健康检查循环收到关闭信号");
                break;
            }
        }
    }
}

/// 屏蔽数据库URL中的密码
fn mask_database_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // 没有密码时冒号属于scheme
            if url[colon_pos + 1..].starts_with("//") {
                return url.to_string();
            }
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}
