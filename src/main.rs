use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use stratum::{
    application::{content::ContentService, error::AppError, origin::ContentOrigin},
    cache::{ContentCache, Prefetcher, ResponseCache, ResponseCachePolicy, ResponseCacheState},
    config,
    infra::{
        admin_client::AdminClient,
        error::InfraError,
        http::{self, AppState},
        origin::HttpOrigin,
        sweeper::Sweeper,
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(args) => run_serve(settings, *args).await,
        config::Command::Prefetch(args) => run_prefetch(settings, args).await,
    }
}

struct ApplicationContext {
    state: AppState,
    content_cache: Arc<ContentCache>,
    response_cache: ResponseCacheState,
    page_ttl: Duration,
}

fn build_application_context(settings: &config::Settings) -> Result<ApplicationContext, AppError> {
    let origin: Arc<dyn ContentOrigin> = Arc::new(HttpOrigin::new(
        &settings.origin.base_url,
        settings.origin.timeout,
    )?);

    let content_cache = Arc::new(ContentCache::new(&settings.cache));
    let responses = Arc::new(ResponseCache::new(settings.cache.response_capacity()));
    let content = Arc::new(ContentService::new(
        Arc::clone(&content_cache),
        Arc::clone(&origin),
    ));
    let prefetcher = Arc::new(Prefetcher::new(Arc::clone(&content_cache), origin));

    let response_cache = ResponseCacheState {
        cache: Arc::clone(&responses),
        policy: ResponseCachePolicy::new(settings.cache.response_content_ttl())
            .with_max_body_bytes(settings.cache.response_max_body_bytes),
        enabled: settings.cache.enable_response_cache,
    };

    Ok(ApplicationContext {
        state: AppState {
            content,
            prefetcher,
            responses,
        },
        content_cache,
        response_cache,
        page_ttl: settings.cache.response_default_ttl(),
    })
}

async fn run_serve(settings: config::Settings, args: config::ServeArgs) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    for slug in &args.warm {
        match app.state.prefetcher.prefetch_page(slug).await {
            Ok(report) => info!(
                target = "stratum::warm",
                slug,
                blocks = report.blocks_warmed(),
                complete = report.is_complete(),
                "Startup prefetch finished"
            ),
            Err(err) => warn!(target = "stratum::warm", slug, error = %err, "Startup prefetch failed"),
        }
    }

    let sweeper_handle = settings.cache.sweep_interval().map(|period| {
        Sweeper::new(
            Arc::clone(&app.content_cache),
            Arc::clone(&app.state.responses),
        )
        .spawn(period)
    });

    let result = serve_http(&settings, app).await;

    if let Some(handle) = sweeper_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn run_prefetch(settings: config::Settings, args: config::PrefetchArgs) -> Result<(), AppError> {
    let server_url = args
        .server_url
        .unwrap_or_else(|| format!("http://{}", settings.server.addr));
    let client = AdminClient::new(&server_url)?;

    let mut failures = 0_usize;
    for slug in &args.slugs {
        match client.prefetch(slug).await {
            Ok(report) => {
                let rendered = serde_json::to_string_pretty(&report)
                    .map_err(|err| AppError::unexpected(format!("failed to render report: {err}")))?;
                println!("{rendered}");
                if !report.is_complete() {
                    failures += 1;
                }
            }
            Err(err) => {
                error!(target = "stratum::prefetch", slug, error = %err, "Prefetch failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(AppError::unexpected(format!(
            "{failures} of {} pages did not prefetch cleanly",
            args.slugs.len()
        )));
    }
    Ok(())
}

async fn serve_http(settings: &config::Settings, app: ApplicationContext) -> Result<(), AppError> {
    let router = http::build_router(app.state, app.response_cache, app.page_ttl);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "stratum::serve",
        addr = %settings.server.addr,
        "Listening"
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        },
    );
    let server = server.into_future();

    let grace = settings.server.graceful_shutdown;
    let drain_deadline = async move {
        if shutdown_rx.wait_for(|stopping| *stopping).await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = drain_deadline => {
            warn!(
                target = "stratum::serve",
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "stratum::serve", "Shutdown requested");
}
