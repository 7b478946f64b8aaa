use std::{process, sync::Arc};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use sitemapd::{
    application::{
        aggregator::CatalogAggregator,
        coordinator::{RebuildCoordinator, RebuildOutcome},
        error::AppError,
        jobs::{SitemapJobContext, process_rebuild_sitemap_job, rebuild_schedule},
        pointer::CurrentArtifactCache,
        publisher::ArtifactPublisher,
        repos::{BlobStore, ContentRepo, LeaseStore, PointerStore},
        serve::SitemapReader,
    },
    config,
    domain::site::SiteRegistry,
    infra::{
        blob::FsBlobStore,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Rebuild(args) => run_rebuild(settings, args).await,
        config::Command::Sites => {
            run_sites(&settings.sites);
            Ok(())
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let pipeline = build_pipeline(repositories.clone(), &settings)?;
    let sites = Arc::new(settings.sites.clone());

    let monitor_handle = spawn_job_monitor(&pipeline.coordinator, &sites)?;

    let startup_handle = settings.sitemap.run_on_start.then(|| {
        let coordinator = pipeline.coordinator.clone();
        let sites = sites.clone();
        tokio::spawn(async move {
            info!(
                target = "sitemapd::startup",
                sites = sites.len(),
                "running startup rebuild pass"
            );
            coordinator.rebuild_all(&sites).await;
        })
    });

    let state = HttpState {
        sitemaps: pipeline.reader,
        sites,
        db: Some(repositories),
    };
    let result = serve_http(&settings, state).await;

    if let Some(handle) = startup_handle {
        handle.abort();
        let _ = handle.await;
    }
    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

async fn run_rebuild(
    settings: config::Settings,
    args: config::RebuildArgs,
) -> Result<(), AppError> {
    let profile = settings
        .sites
        .get(&args.site)
        .ok_or_else(|| AppError::validation(format!("unknown site `{}`", args.site)))?;

    let repositories = init_repositories(&settings).await?;
    let pipeline = build_pipeline(repositories, &settings)?;

    info!(
        target = "sitemapd::rebuild",
        site = %profile.context,
        owner = pipeline.coordinator.owner(),
        "Starting rebuild"
    );

    match pipeline.coordinator.rebuild(&profile).await? {
        RebuildOutcome::Published(summary) => info!(
            target = "sitemapd::rebuild",
            site = %profile.context,
            artifact_id = %summary.publish.artifact_id,
            entries = summary.entries,
            bytes = summary.publish.bytes,
            "Rebuild completed"
        ),
        RebuildOutcome::Skipped => warn!(
            target = "sitemapd::rebuild",
            site = %profile.context,
            "Rebuild skipped; another instance holds the lease"
        ),
    }

    Ok(())
}

fn run_sites(sites: &SiteRegistry) {
    for profile in sites.profiles() {
        println!(
            "{}\t{}\t{}\t{}",
            profile.context,
            profile.base_url,
            profile.locales.join(","),
            profile.schedule
        );
    }
}

struct Pipeline {
    coordinator: RebuildCoordinator,
    reader: SitemapReader,
}

fn build_pipeline(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<Pipeline, AppError> {
    let content_repo: Arc<dyn ContentRepo> = repositories.clone();
    let pointer_store: Arc<dyn PointerStore> = repositories.clone();
    let lease_store: Arc<dyn LeaseStore> = repositories;

    let blobs: Arc<dyn BlobStore> = Arc::new(
        FsBlobStore::new(settings.storage.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let pointer = CurrentArtifactCache::new(pointer_store, settings.sitemap.pointer_ttl);
    let publisher = ArtifactPublisher::new(blobs.clone(), pointer.clone());
    let aggregator = CatalogAggregator::new(content_repo);

    let owner = settings
        .sitemap
        .instance_id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", process::id(), Uuid::new_v4()));

    let coordinator = RebuildCoordinator::new(
        lease_store,
        aggregator,
        publisher,
        owner,
        settings.sitemap.lease_ttl,
    );

    Ok(Pipeline {
        coordinator,
        reader: SitemapReader::new(pointer, blobs),
    })
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(
        database_url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn spawn_job_monitor(
    coordinator: &RebuildCoordinator,
    sites: &SiteRegistry,
) -> Result<tokio::task::JoinHandle<()>, AppError> {
    let mut monitor = Monitor::new();

    for profile in sites.profiles() {
        let schedule = rebuild_schedule(&profile.schedule)
            .map_err(|err| InfraError::schedule(profile.context.as_str(), err))?;
        let context = SitemapJobContext {
            coordinator: coordinator.clone(),
            profile: profile.clone(),
        };
        let worker = WorkerBuilder::new(format!("sitemap-rebuild-{}", profile.context))
            .data(context)
            .backend(CronStream::new(schedule))
            .build_fn(process_rebuild_sitemap_job);
        monitor = monitor.register(worker);
    }

    Ok(tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    }))
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "sitemapd::http",
        addr = %settings.server.addr,
        "listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { signal.notified().await })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            return joined
                .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
                .map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| AppError::from(InfraError::from(err)))?;
        }
    }

    info!(target = "sitemapd::http", "shutdown requested; draining connections");
    shutdown.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => joined
            .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
            .map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                target = "sitemapd::http",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out; aborting open connections"
            );
            server.abort();
            Ok(())
        }
    }
}
