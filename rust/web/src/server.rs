use crate::events::EventBus;
use crate::handlers;
use crate::orchestrator::AiOrchestrator;
use crate::session::{CreateGameParams, SessionError, SessionStore};
use crate::settings::{EngineSettings, SettingsError};
use cadavre_ai::{create_generator, TurnGenerator};
use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use warp::filters::BoxedFilter;
use warp::{Filter, Reply};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: String,
    port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn for_tests() -> Self {
        Self::new("127.0.0.1", 0)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Everything the request handlers share, constructed once at startup and
/// passed around explicitly. There are no global service accessors.
#[derive(Clone)]
pub struct AppContext {
    config: ServerConfig,
    settings: EngineSettings,
    event_bus: Arc<EventBus>,
    store: Arc<SessionStore>,
    orchestrator: Arc<AiOrchestrator>,
}

impl AppContext {
    /// Build a context from the environment, with the default generator.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let settings = EngineSettings::from_env()?;
        Ok(Self::with_settings(config, settings, create_generator("scribble")))
    }

    pub fn with_settings(
        config: ServerConfig,
        settings: EngineSettings,
        generator: Arc<dyn TurnGenerator>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::with_buffer(settings.event_buffer));
        let store = Arc::new(SessionStore::new(Arc::clone(&event_bus), settings.clone()));
        let orchestrator = Arc::new(AiOrchestrator::new(Arc::clone(&store), generator));
        Self {
            config,
            settings,
            event_bus,
            store,
            orchestrator,
        }
    }

    pub fn new_for_tests() -> Self {
        Self::with_settings(
            ServerConfig::for_tests(),
            EngineSettings::default(),
            create_generator("scribble"),
        )
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.store)
    }

    pub fn orchestrator(&self) -> Arc<AiOrchestrator> {
        Arc::clone(&self.orchestrator)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Settings error: {0}")]
    SettingsError(#[from] SettingsError),
    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),
}

#[derive(Clone)]
pub struct WebServer {
    context: AppContext,
}

impl WebServer {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let context = AppContext::new(config)?;
        Ok(Self { context })
    }

    pub fn from_context(context: AppContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let WebServer { context } = self;
        let config = context.config().clone();
        let bind_addr = Self::bind_addr(&config)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let routes = Self::routes(&context);
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server_future) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, shutdown_signal)
            .map_err(Self::map_warp_error)?;

        tracing::info!(address = %addr, "game session server listening");

        let task = tokio::spawn(async move {
            server_future.await;
            Ok(())
        });

        Ok(ServerHandle::new(addr, shutdown_tx, task, context))
    }

    fn bind_addr(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
        let host = config.host();

        if let Ok(addr) = host.parse::<SocketAddr>() {
            return Ok(addr);
        }
        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, config.port()));
        }

        let candidate = format!("{}:{}", host, config.port());
        let mut addrs = candidate.to_socket_addrs().map_err(|err| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`: {err}"))
        })?;
        addrs.next().ok_or_else(|| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`"))
        })
    }

    fn map_warp_error(err: warp::Error) -> ServerError {
        use std::error::Error as StdError;

        if let Some(source) = err.source() {
            if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
                let recreated = std::io::Error::new(io_err.kind(), io_err.to_string());
                return ServerError::BindError(recreated);
            }
        }
        ServerError::ConfigError(err.to_string())
    }

    fn routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let health = Self::health_route();
        let game_routes = Self::game_routes(context);
        let sse_routes = Self::sse_routes(context);

        health
            .or(game_routes)
            .unify()
            .or(sse_routes)
            .unify()
            .boxed()
    }

    fn health_route() -> BoxedFilter<(warp::reply::Response,)> {
        warp::path("health")
            .and(warp::get())
            .and(warp::path::end())
            .map(|| handlers::health().into_response())
            .boxed()
    }

    fn game_routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let store = context.store();
        let orchestrator = context.orchestrator();

        let create = warp::path!("api" / "games")
            .and(warp::post())
            .and(Self::with_store(store.clone()))
            .and(warp::body::json())
            .and_then(
                |store: Arc<SessionStore>, params: CreateGameParams| async move {
                    Ok::<_, Infallible>(handlers::create_game(store, params).await)
                },
            );

        let snapshot = warp::path!("api" / "games" / String)
            .and(warp::get())
            .and(Self::with_store(store.clone()))
            .and_then(|session_id: String, store: Arc<SessionStore>| async move {
                Ok::<_, Infallible>(handlers::get_game(store, session_id).await)
            });

        let join = warp::path!("api" / "games" / String / "join")
            .and(warp::post())
            .and(Self::with_store(store.clone()))
            .and(warp::body::json())
            .and_then(
                |session_id: String, store: Arc<SessionStore>, request: handlers::JoinRequest| async move {
                    Ok::<_, Infallible>(handlers::join_game(store, session_id, request).await)
                },
            );

        let leave = warp::path!("api" / "games" / String / "leave")
            .and(warp::post())
            .and(Self::with_store(store.clone()))
            .and(warp::body::json())
            .and_then(
                |session_id: String, store: Arc<SessionStore>, request: handlers::LeaveRequest| async move {
                    Ok::<_, Infallible>(handlers::leave_game(store, session_id, request).await)
                },
            );

        let turns = warp::path!("api" / "games" / String / "turns")
            .and(warp::post())
            .and(Self::with_store(store.clone()))
            .and(Self::with_orchestrator(orchestrator.clone()))
            .and(warp::body::json())
            .and_then(
                |session_id: String,
                 store: Arc<SessionStore>,
                 orchestrator: Arc<AiOrchestrator>,
                 request: handlers::SubmitTurnRequest| async move {
                    Ok::<_, Infallible>(
                        handlers::submit_turn(store, orchestrator, session_id, request).await,
                    )
                },
            );

        let retry_ai = warp::path!("api" / "games" / String / "retry-ai")
            .and(warp::get())
            .and(Self::with_orchestrator(orchestrator))
            .and_then(
                |session_id: String, orchestrator: Arc<AiOrchestrator>| async move {
                    Ok::<_, Infallible>(handlers::retry_ai_turn(orchestrator, session_id).await)
                },
            );

        let cleanup = warp::path!("api" / "cleanup")
            .and(warp::post())
            .and(Self::with_store(store))
            .and_then(|store: Arc<SessionStore>| async move {
                Ok::<_, Infallible>(handlers::cleanup(store).await)
            });

        create
            .or(snapshot)
            .unify()
            .or(join)
            .unify()
            .or(leave)
            .unify()
            .or(turns)
            .unify()
            .or(retry_ai)
            .unify()
            .or(cleanup)
            .unify()
            .boxed()
    }

    fn sse_routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let store = context.store();
        let event_bus = context.event_bus();

        warp::path!("api" / "games" / String / "events")
            .and(warp::get())
            .and(warp::query::<handlers::StreamQuery>())
            .and(Self::with_store(store))
            .and(Self::with_event_bus(event_bus))
            .and_then(
                |session_id: String,
                 query: handlers::StreamQuery,
                 store: Arc<SessionStore>,
                 event_bus: Arc<EventBus>| async move {
                    Ok::<_, Infallible>(
                        handlers::stream_events(session_id, query, store, event_bus).await,
                    )
                },
            )
            .boxed()
    }

    fn with_store(
        store: Arc<SessionStore>,
    ) -> impl Filter<Extract = (Arc<SessionStore>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&store))
    }

    fn with_orchestrator(
        orchestrator: Arc<AiOrchestrator>,
    ) -> impl Filter<Extract = (Arc<AiOrchestrator>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&orchestrator))
    }

    fn with_event_bus(
        event_bus: Arc<EventBus>,
    ) -> impl Filter<Extract = (Arc<EventBus>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&event_bus))
    }
}

pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
    context: AppContext,
}

impl ServerHandle {
    fn new(
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ServerError>>,
        context: AppContext,
    ) -> Self {
        Self {
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
            context,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(err) => {
                    return Err(ServerError::ConfigError(format!(
                        "server task join error: {err}"
                    )))
                }
            }
        }
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
