// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use capg_firewall_operator::{
    cluster_store::{ClusterStore, KubeClusterStore, ObjectKey},
    config::OperatorConfig,
    constants::{
        GCP_HTTP_TIMEOUT_SECS, LEADER_LEASE_DURATION_SECS, LEADER_LEASE_GRACE_SECS,
        LEADER_LEASE_NAME, TOKIO_WORKER_THREADS,
    },
    context::RequestContext,
    crd::GCPCluster,
    errors::Error,
    firewall::{GcpFirewallClient, RuleReconciler},
    gcp::{
        auth::{MetadataTokenSource, StaticTokenSource, TokenSource},
        ComputeClient,
    },
    metrics,
    nat::IpResolver,
    reconcilers::GCPClusterReconciler,
    security::{GcpSecurityPolicyClient, PolicyReconciler},
    server::{self, Readiness},
};
use clap::Parser;
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use kube_lease_manager::LeaseManagerBuilder;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Shared state handed to every reconciliation.
struct ControllerContext {
    reconciler: GCPClusterReconciler,
    shutdown: CancellationToken,
    requeue_interval: Duration,
    error_requeue: Duration,
}

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("capg-firewall-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let config = OperatorConfig::parse();

    // Respects RUST_LOG (default INFO) and RUST_LOG_FORMAT=json|text
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!(
        management_cluster = %config.management_cluster(),
        nat_ip_strategy = ?config.nat_ip_strategy,
        require_router = config.require_router,
        leader_elect = config.leader_elect,
        "Starting CAPG firewall operator"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;

    let reconciler = build_reconciler(&config, client.clone())?;

    let shutdown = CancellationToken::new();
    let readiness = Readiness::default();

    spawn_servers(&config, readiness.clone(), shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => info!("Initiating graceful shutdown"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signals"),
        }
        signal_token.cancel();
    });

    let ctx = Arc::new(ControllerContext {
        reconciler,
        shutdown: shutdown.clone(),
        requeue_interval: config.requeue_interval(),
        error_requeue: config.error_requeue(),
    });

    let result = if config.leader_elect {
        run_with_leader_election(&config, client.clone(), ctx, readiness, shutdown.clone()).await
    } else {
        readiness.set_ready(true);
        tokio::select! {
            () = run_controller(client.clone(), ctx) => {
                error!("CRITICAL: GCPCluster controller exited unexpectedly");
                Err(anyhow::anyhow!("GCPCluster controller exited unexpectedly"))
            }
            () = shutdown.cancelled() => Ok(()),
        }
    };

    shutdown.cancel();
    info!("CAPG firewall operator stopped");
    result
}

/// Wire the GCP clients and reconcilers together.
fn build_reconciler(config: &OperatorConfig, client: Client) -> Result<GCPClusterReconciler> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(GCP_HTTP_TIMEOUT_SECS))
        .build()?;

    let tokens: Arc<dyn TokenSource> = match &config.gcp_access_token {
        Some(token) => {
            info!("Using static GCP access token");
            Arc::new(StaticTokenSource::new(token.clone()))
        }
        None => {
            debug!("Using GCE metadata server for GCP access tokens");
            Arc::new(MetadataTokenSource::new(http.clone()))
        }
    };

    let compute = ComputeClient::new(http, &config.compute_endpoint, tokens)
        .context("invalid Compute API endpoint")?;

    let store: Arc<dyn ClusterStore> = Arc::new(KubeClusterStore::new(client));

    let firewall = RuleReconciler::new(
        config.default_bastion_allowlist.clone().into_inner(),
        Arc::new(GcpFirewallClient::new(compute.clone())),
    );
    let policy = PolicyReconciler::new(
        config.default_api_allowlist.clone().into_inner(),
        config.management_cluster(),
        Arc::new(GcpSecurityPolicyClient::new(compute.clone())),
        Arc::new(IpResolver::new(store.clone(), compute, config.nat_ip_strategy)),
    );

    Ok(GCPClusterReconciler::new(
        store,
        firewall,
        policy,
        config.require_router,
    ))
}

/// Start the metrics and probe servers in the background.
fn spawn_servers(config: &OperatorConfig, readiness: Readiness, shutdown: CancellationToken) {
    let metrics_addr = config.metrics_bind_address;
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) =
            server::serve(metrics_addr, server::metrics_router(), metrics_shutdown).await
        {
            error!(error = %e, addr = %metrics_addr, "Metrics server failed");
        }
    });

    let probe_addr = config.health_probe_bind_address;
    tokio::spawn(async move {
        if let Err(e) =
            server::serve(probe_addr, server::health_router(readiness), shutdown).await
        {
            error!(error = %e, addr = %probe_addr, "Health probe server failed");
        }
    });
}

/// Run the controller only while this replica holds the leader lease.
async fn run_with_leader_election(
    config: &OperatorConfig,
    client: Client,
    ctx: Arc<ControllerContext>,
    readiness: Readiness,
    shutdown: CancellationToken,
) -> Result<()> {
    let identity = lease_identity();
    info!(
        lease = LEADER_LEASE_NAME,
        namespace = %config.leader_election_namespace,
        identity = %identity,
        "Starting leader election"
    );

    let manager = LeaseManagerBuilder::new(client.clone(), LEADER_LEASE_NAME)
        .with_namespace(config.leader_election_namespace.clone())
        .with_identity(identity)
        .with_duration(LEADER_LEASE_DURATION_SECS)
        .with_grace(LEADER_LEASE_GRACE_SECS)
        .build()
        .await?;
    let (mut leader, lease_task) = manager.watch().await;

    metrics::record_leader_status(false);
    while !*leader.borrow_and_update() {
        tokio::select! {
            changed = leader.changed() => changed.context("leader election stopped")?,
            () = shutdown.cancelled() => return Ok(()),
        }
    }

    info!("Acquired leadership");
    metrics::record_leader_status(true);
    readiness.set_ready(true);

    let result = tokio::select! {
        () = run_controller(client, ctx) => {
            error!("CRITICAL: GCPCluster controller exited unexpectedly");
            Err(anyhow::anyhow!("GCPCluster controller exited unexpectedly"))
        }
        () = wait_for_leadership_loss(&mut leader) => {
            error!("Lost leadership, stopping so another replica can take over");
            Err(anyhow::anyhow!("lost leadership"))
        }
        () = shutdown.cancelled() => Ok(()),
    };

    readiness.set_ready(false);
    metrics::record_leader_status(false);

    // Dropping the receiver makes the lease task release the lease.
    drop(leader);
    match lease_task.await {
        Ok(Ok(_)) => debug!("Leader lease released"),
        Ok(Err(e)) => warn!(error = %e, "Failed to release leader lease"),
        Err(e) => warn!(error = %e, "Leader lease task panicked"),
    }

    result
}

/// Identity of this replica in the leader lease.
fn lease_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "capg-firewall-operator".to_string())
}

/// Resolve once the leadership flag turns false or its sender goes away.
async fn wait_for_leadership_loss(leader: &mut watch::Receiver<bool>) {
    while leader.changed().await.is_ok() {
        if !*leader.borrow_and_update() {
            return;
        }
    }
}

/// Run the `GCPCluster` controller
async fn run_controller(client: Client, ctx: Arc<ControllerContext>) {
    info!("Starting GCPCluster controller");

    let api = Api::<GCPCluster>::all(client);

    Controller::new(api, Config::default())
        .run(reconcile_wrapper, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(object = ?object, "Reconciled"),
                Err(e) => debug!(error = %e, "Reconcile attempt failed"),
            }
        })
        .await;
}

async fn reconcile_wrapper(
    cluster: Arc<GCPCluster>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, Error> {
    let namespace = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();
    let span = info_span!("reconcile", gcpcluster = %format!("{namespace}/{name}"));

    async move {
        let start = Instant::now();
        let request = RequestContext::new(&namespace, &name, ctx.shutdown.child_token());
        let key = ObjectKey::new(namespace.as_str(), name.as_str());

        match ctx.reconciler.reconcile(&request, &key).await {
            Ok(outcome) => {
                metrics::record_reconciliation(outcome.as_str(), start.elapsed());
                debug!(outcome = outcome.as_str(), "Reconciliation finished");
                Ok(outcome
                    .requeue_after(ctx.requeue_interval)
                    .map_or_else(Action::await_change, Action::requeue))
            }
            Err(e) => {
                metrics::record_reconciliation_error(e.kind(), start.elapsed());
                error!(
                    cluster = %request.cluster,
                    error = %e,
                    kind = e.kind().as_str(),
                    "Failed to reconcile GCPCluster"
                );
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

fn error_policy(cluster: Arc<GCPCluster>, err: &Error, ctx: Arc<ControllerContext>) -> Action {
    warn!(
        gcpcluster = %cluster.name_any(),
        error = %err,
        requeue_secs = ctx.error_requeue.as_secs(),
        "Requeueing after error"
    );
    Action::requeue(ctx.error_requeue)
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => info!("Received SIGTERM (pod termination)"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received SIGINT");
    }
    Ok(())
}
