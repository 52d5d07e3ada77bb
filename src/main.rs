use anyhow::Result;
use napcat_adapter::access::ListGate;
use napcat_adapter::adapters::maibot::BusSender;
use napcat_adapter::adapters::onebot::{self, OneBotConnection, api::OneBotFetcher};
use napcat_adapter::ban::announcer::Announcer;
use napcat_adapter::ban::detector::{self, DETECT_INTERVAL};
use napcat_adapter::ban::loader::ReconcilingLoader;
use napcat_adapter::ban::store::SqliteBanStore;
use napcat_adapter::ban::BanTracker;
use napcat_adapter::clock::{Clock, SystemClock};
use napcat_adapter::config::AppConfig;
use napcat_adapter::fetcher::InfoFetcher;
use napcat_adapter::log::{self, Level};
use napcat_adapter::notice::NoticeHandler;
use napcat_adapter::scheduler::Scheduler;
use napcat_adapter::{db, delivery, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CONFIG_PATH: &str = "config.toml";
/// 关闭时等待后台任务退出的时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(CONFIG_PATH).await?;
    let level = Level::parse(&config.log.level).unwrap_or_else(|| {
        warn!(target: "Main", "无法识别的日志级别 {:?}，使用 info", config.log.level);
        Level::Info
    });
    log::init(level);

    info!(target: "Main", "NapCat 适配器启动中...");

    let conn = db::init(&config.database.url).await?;
    let store = Arc::new(SqliteBanStore::init(conn).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = Scheduler::new();

    let napcat = OneBotConnection::new();
    let fetcher: Arc<dyn InfoFetcher> = Arc::new(OneBotFetcher::new(napcat.clone()));

    let bus = Arc::new(BusSender::new(&config.maibot_server));
    scheduler.spawn(bus.clone().run(scheduler.subscribe()));

    let tracker = Arc::new(BanTracker::new(store.clone()));
    let (queue, pump) = delivery::channel(bus.clone());
    let platform = config.maibot_server.platform_name.as_str();

    let handler = NoticeHandler::new(
        platform,
        config.chat.enable_poke,
        fetcher.clone(),
        Arc::new(ListGate::new(config.chat.clone())),
        tracker.clone(),
        queue.clone(),
        bus.clone(),
        clock.clone(),
    );

    // notice 在连接就绪前就可能到达，处理任务先行启动
    let (notice_tx, notice_rx) = mpsc::channel(onebot::NOTICE_BACKLOG);
    scheduler.spawn(onebot::run(
        config.napcat_server.clone(),
        napcat.clone(),
        notice_tx,
        scheduler.subscribe(),
    ));
    let shutdown = scheduler.subscribe();
    scheduler.spawn(async move { handler.run(notice_rx, shutdown).await });

    info!(target: "Main", "等待 NapCat 连接...");
    tokio::select! {
        _ = napcat.wait_until_ready() => {}
        _ = tokio::signal::ctrl_c() => {
            info!(target: "Main", "收到退出信号，正在停止...");
            scheduler.shutdown(SHUTDOWN_GRACE).await;
            return Ok(());
        }
    }

    let loader = ReconcilingLoader::new(store, fetcher.clone(), clock.clone());
    if let Err(e) = tracker.load_from_store(&loader).await {
        error!(target: "Main", "加载禁言记录失败: {:#}", e);
        scheduler.shutdown(SHUTDOWN_GRACE).await;
        return Err(e);
    }

    {
        let tracker = tracker.clone();
        let clock = clock.clone();
        scheduler.add_interval(DETECT_INTERVAL, move || {
            let tracker = tracker.clone();
            let clock = clock.clone();
            async move {
                detector::tick(&tracker, clock.as_ref()).await;
            }
        });
    }

    let announcer = Announcer::new(platform, tracker, fetcher, queue, clock);
    scheduler.spawn(announcer.run(scheduler.subscribe()));
    scheduler.spawn(pump.run(scheduler.subscribe()));

    info!(target: "Main", "启动完成，开始处理 notice 事件");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(target: "Main", "监听退出信号失败: {}", e);
    }
    info!(target: "Main", "收到退出信号，正在停止...");
    scheduler.shutdown(SHUTDOWN_GRACE).await;

    Ok(())
}
