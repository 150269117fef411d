use anyhow::Context;
use dotenvy::dotenv;
use interview_llm::api;
use interview_llm::config::{ChatArgs, Config, GenerateArgs, Service};
use interview_llm::model::llama::{LlamaBackend, LoadOptions};
use interview_llm::model::ModelSource;
use interview_llm::prompt::DEFAULT_SYSTEM_PROMPT;
use interview_llm::util::load_system_prompt;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, EnvFilter};


#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
dotenv().ok();
let cfg = <Config as clap::Parser>::parse();


// logs
let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
fmt().with_env_filter(filter).init();


let metrics = PrometheusBuilder::new().install_recorder().context("install metrics recorder")?;


let app = match &cfg.service {
    Service::Chat(args) => chat_app(&cfg, args).await?,
    Service::Generate(args) => generate_app(&cfg, args).await?,
};
let app = app.merge(api::metrics_routes(metrics)).layer(TraceLayer::new_for_http());
let addr: SocketAddr = cfg.bind_addr.parse().with_context(|| format!("bind address {:?}", cfg.bind_addr))?;


tracing::info!(%addr, "listening");
axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
Ok(())
}


/// Resolve and load on the blocking pool; the hub download and GGUF load both block.
async fn load_backend(source: ModelSource, opts: LoadOptions) -> anyhow::Result<LlamaBackend> {
    tracing::info!(%source, "loading model");
    tokio::task::spawn_blocking(move || {
        let path = source.resolve()?;
        LlamaBackend::new(path, opts)
    })
    .await
    .context("model load task panicked")?
}


// Load failure is fatal for this service.
async fn chat_app(cfg: &Config, args: &ChatArgs) -> anyhow::Result<Router> {
    let source = args.model_source();
    let backend = load_backend(source.clone(), cfg.load_options(args.n_gpu_layers)).await?;
    tracing::info!(model = %source, "model and tokenizer loaded");
    Ok(api::chat_routes(backend, args.infer_params(), &source.display_name()))
}


// Load failure is logged and the service keeps answering with the unavailable body.
async fn generate_app(cfg: &Config, args: &GenerateArgs) -> anyhow::Result<Router> {
    let system_prompt = load_system_prompt(args.system_prompt_file.as_deref(), DEFAULT_SYSTEM_PROMPT)?;
    let source = args.model_source();
    let backend = match load_backend(source.clone(), cfg.load_options(args.n_gpu_layers)).await {
        Ok(b) => {
            tracing::info!(model = %source, "inference engine ready");
            Some(b)
        }
        Err(e) => {
            tracing::error!(model = %source, error = %format!("{e:#}"), "failed to load model");
            None
        }
    };
    Ok(api::generate_routes(backend, system_prompt, args.infer_params()))
}


async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
