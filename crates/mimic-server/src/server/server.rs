//! MockServer construction, binding, and accept loop.

use crate::config::Config;
use crate::datagen::DataGenerator;
use crate::request_log::RequestLog;
use crate::server::handler::{handle_request, HandlerContext};
use crate::server::reload::ReloadCoordinator;
use crate::server::router::{CompiledRouter, RouterHandle};
use crate::server::tls::create_tls_acceptor;
use crate::spec;
use crate::store::MockStore;
use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

/// The mock server, fully constructed but not yet bound.
pub struct MockServer {
    config: Arc<Config>,
    ctx: Arc<HandlerContext>,
    reload: Arc<ReloadCoordinator>,
}

impl MockServer {
    /// Load the spec, compile the initial router, and wire the components.
    /// A spec that fails to load or compile here is fatal.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        config.validate()?;

        let doc = spec::load_document(config.spec_path())
            .with_context(|| format!("failed to load spec {}", config.spec_path().display()))?;
        let router = CompiledRouter::compile(&doc)?;
        let initial_routes = router.labels();

        let store = Arc::new(MockStore::new());
        let log = Arc::new(RequestLog::new(config.logging.max_entries));
        let datagen = Arc::new(DataGenerator::new(&config.data));
        let router = Arc::new(RouterHandle::new(router));
        let config = Arc::new(config);

        let ctx = Arc::new(HandlerContext {
            config: Arc::clone(&config),
            router: Arc::clone(&router),
            store: Arc::clone(&store),
            log,
            datagen,
        });
        let reload = Arc::new(ReloadCoordinator::new(
            Arc::clone(&config),
            router,
            store,
            initial_routes,
        ));

        Ok(Self {
            config,
            ctx,
            reload,
        })
    }

    /// Bind the listener (and TLS acceptor if configured). Split from
    /// `serve` so tests can bind port 0 and read the assigned address.
    pub async fn bind(self) -> Result<BoundServer, anyhow::Error> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .with_context(|| {
                format!("failed to bind {}:{}", self.config.host, self.config.port)
            })?;
        let local_addr = listener.local_addr()?;

        let tls_acceptor = match self.config.tls {
            Some(ref tls) => Some(create_tls_acceptor(&tls.cert_path, &tls.key_path)?),
            None => None,
        };

        Ok(BoundServer {
            config: self.config,
            ctx: self.ctx,
            reload: self.reload,
            listener,
            local_addr,
            tls_acceptor,
        })
    }
}

pub struct BoundServer {
    config: Arc<Config>,
    ctx: Arc<HandlerContext>,
    reload: Arc<ReloadCoordinator>,
    listener: TcpListener,
    local_addr: SocketAddr,
    tls_acceptor: Option<TlsAcceptor>,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the task is dropped.
    pub async fn serve(self) -> Result<(), anyhow::Error> {
        let scheme = if self.tls_acceptor.is_some() {
            "https"
        } else {
            "http"
        };
        info!("spec: {}", self.config.spec_path().display());
        info!("mock server listening on {}://{}", scheme, self.local_addr);
        info!("health endpoint: {}", self.config.endpoints.health);
        info!("routes: {}", self.ctx.router.current().len());

        if self.config.watch {
            info!("watching spec file for changes");
            tokio::spawn(Arc::clone(&self.reload).watch());
        }

        loop {
            let (stream, remote_addr) = self.listener.accept().await?;
            let ctx = Arc::clone(&self.ctx);
            let tls_acceptor = self.tls_acceptor.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let ctx = Arc::clone(&ctx);
                    async move { handle_request(&ctx, req).await }
                });

                match tls_acceptor {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let io = TokioIo::new(tls_stream);
                            if let Err(err) =
                                http1::Builder::new().serve_connection(io, service).await
                            {
                                error!(
                                    "error serving HTTPS connection from {}: {}",
                                    remote_addr, err
                                );
                            }
                        }
                        Err(err) => {
                            error!("TLS handshake failed from {}: {}", remote_addr, err);
                        }
                    },
                    None => {
                        let io = TokioIo::new(stream);
                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            error!("error serving connection from {}: {}", remote_addr, err);
                        }
                    }
                }
            });
        }
    }
}
