use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use topic_chat::backend::{LoopbackAuthClient, LoopbackClientFactory, LoopbackService};
use topic_chat::config::{self, AppConfig};
use topic_chat::network::{
    ChatRoom, HttpTokenEndpoint, RetryPolicy, SessionManager, SubscriptionController,
};
use topic_chat::server::{self, TokenEndpointState};
use topic_chat::ui::ChatApp;

#[derive(Parser)]
#[command(
    name = "topic_chat",
    version,
    about = "Real-time chat over a managed pub/sub topic"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Display name used in the room
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    topic: Option<String>,
    #[arg(long)]
    cache: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Write the default config file and exit
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    if cli.mode == Some(Mode::InitConfig) {
        config::save_config(&cli.config, &AppConfig::default())?;
        log::info!("Wrote default config to {}", cli.config);
        return Ok(());
    }

    let mut app_config = config::load_config(&cli.config)?;
    if let Some(username) = cli.username {
        app_config.username = username;
    }
    if let Some(topic) = cli.topic {
        app_config.topic_name = topic;
    }
    if let Some(cache) = cli.cache {
        app_config.cache_name = cache;
    }
    app_config.validate()?;

    let service = LoopbackService::new();
    service.create_cache(&app_config.cache_name)?;
    let _sweeper = service.spawn_expiry_sweeper(app_config.sweep_interval());

    run_full_client(service, app_config).await
}

fn token_endpoint_state(
    service: &Arc<LoopbackService>,
    app_config: &AppConfig,
) -> TokenEndpointState {
    let master = config::master_credential();
    if master.is_none() {
        log::warn!(
            "{} is not set; the token endpoint will refuse to mint tokens",
            config::MASTER_CREDENTIAL_ENV
        );
    }
    let auth_client = Arc::new(LoopbackAuthClient::new(service.clone(), master));
    log::info!("Auth client built");
    TokenEndpointState::new(auth_client.clone(), auth_client, app_config.token_lifetime())
}

async fn run_full_client(
    service: Arc<LoopbackService>,
    app_config: AppConfig,
) -> Result<(), Box<dyn Error>> {
    // 1. Token endpoint runs in the background of this process
    let listener = TcpListener::bind(app_config.bind_socket_addr()?).await?;
    let state = token_endpoint_state(&service, &app_config);
    tokio::spawn(async move {
        if let Err(err) = server::serve(listener, state).await {
            log::error!("Token endpoint terminated: {err}");
        }
    });

    let endpoint = Arc::new(HttpTokenEndpoint::new(
        &app_config.origin,
        app_config.token_fetch_timeout(),
    )?);
    match endpoint.list_caches().await {
        Ok(caches) if !caches.contains(&app_config.cache_name) => {
            log::warn!(
                "Cache {} is not among {:?}; subscribing will fail",
                app_config.cache_name,
                caches
            );
        }
        Ok(_) => {}
        Err(err) => log::warn!("Unable to list caches: {err}"),
    }

    let sessions = Arc::new(SessionManager::new(
        endpoint,
        Arc::new(LoopbackClientFactory::new(service)),
        app_config.transport(),
    ));
    let subscriptions = Arc::new(SubscriptionController::new(
        sessions,
        RetryPolicy::from(&app_config.retry),
    ));

    // 2. Channels
    // UI -> Room
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Room -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    // 3. Chat room task
    let room = ChatRoom::new(
        app_config.cache_name.clone(),
        app_config.topic_name.clone(),
        app_config.username.clone(),
        subscriptions,
        event_tx,
        cmd_rx,
    );
    tokio::spawn(async move {
        if let Err(err) = room.run().await {
            log::error!("Chat room terminated: {err}");
        }
    });

    // 4. UI on the main thread
    let options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);
    let topic_name = app_config.topic_name.clone();

    eframe::run_native(
        "Topic Chat",
        options,
        Box::new(move |cc| {
            let Some(event_receiver) = event_rx.take() else {
                return Err("ChatApp should only be initialized once".into());
            };

            log::info!("Joined {topic_name} as {}", app_config.username);

            Ok(Box::new(ChatApp::new(
                cc,
                &topic_name,
                cmd_tx.clone(),
                event_receiver,
            )))
        }),
    )?;

    Ok(())
}
