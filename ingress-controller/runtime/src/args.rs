use crate::{
    auth::{Gate, GateConfig, PolicyResource},
    index,
    k8s::{self, IngressClass},
    server,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, path::PathBuf};
use tokio::{sync::mpsc, time::Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "ingress", about = "An ingress certificate and auth controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "ingress=info,warn",
        env = "INGRESS_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Directory where certificate PEM artifacts are written.
    #[clap(long, default_value = "/etc/ingress-controller/ssl")]
    ssl_dir: PathBuf,

    #[clap(long, default_value = "nginx")]
    ingress_class: IngressClass,

    #[clap(long, default_value = "ingress.kubernetes.io")]
    annotations_prefix: String,

    /// Seconds between sweeps for missing secrets and incomplete chains.
    #[clap(long, default_value = "10")]
    sync_period: u64,

    /// Seconds allowed to resolve a certificate chain.
    #[clap(long, default_value = "10")]
    chain_timeout: u64,

    /// Disables the auth subrequest server.
    #[clap(long)]
    auth_disabled: bool,

    #[clap(long, default_value = "0.0.0.0:8091")]
    auth_addr: SocketAddr,

    /// Base URL of the identity provider.
    #[clap(long, env = "INGRESS_IDENTITY_ENDPOINT")]
    identity_endpoint: Option<String>,

    /// Base URL of the policy decision point.
    #[clap(long, env = "INGRESS_PDP_ENDPOINT")]
    pdp_endpoint: Option<String>,

    /// Seconds allowed for each identity or policy call.
    #[clap(long, default_value = "5")]
    auth_timeout: u64,

    #[clap(long, default_value = "identity_token")]
    identity_cookie: String,

    #[clap(long, default_value = "access_token")]
    access_cookie: String,

    #[clap(long, default_value = "policy_token")]
    policy_cookie: String,

    /// Directory holding 401.html, 403.html and 404.html.
    #[clap(long, env = "ERROR_PAGE_DIR")]
    error_page_dir: Option<PathBuf>,

    #[clap(long, default_value = "")]
    policy_crn: String,

    #[clap(long, default_value = "")]
    policy_service_name: String,

    #[clap(long, default_value = "")]
    policy_account_id: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            ssl_dir,
            ingress_class,
            annotations_prefix,
            sync_period,
            chain_timeout,
            auth_disabled,
            auth_addr,
            identity_endpoint,
            pdp_endpoint,
            auth_timeout,
            identity_cookie,
            access_cookie,
            policy_cookie,
            error_page_dir,
            policy_crn,
            policy_service_name,
            policy_account_id,
        } = self;

        let gate = if auth_disabled {
            None
        } else {
            let (Some(identity_endpoint), Some(pdp_endpoint)) = (identity_endpoint, pdp_endpoint)
            else {
                bail!("--identity-endpoint and --pdp-endpoint are required unless --auth-disabled is set");
            };
            let gate = Gate::new(GateConfig {
                identity_endpoint,
                pdp_endpoint,
                timeout: Duration::from_secs(auth_timeout),
                identity_cookie,
                access_cookie,
                policy_cookie,
                error_page_dir,
                resource: PolicyResource {
                    crn: policy_crn,
                    service_name: policy_service_name,
                    account_id: policy_account_id,
                },
            })
            .context("failed to build auth gate")?;
            Some(gate)
        };

        std::fs::create_dir_all(&ssl_dir)
            .with_context(|| format!("failed to create {}", ssl_dir.display()))?;
        let chain_timeout = Duration::from_secs(chain_timeout);
        let http = reqwest::Client::builder()
            .timeout(chain_timeout)
            .build()
            .context("failed to build chain resolver client")?;

        // Build the certificate store and the watch indexes that feed it.
        let store = index::CertStore::shared();
        let (reconfigure_tx, mut reconfigure_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let secret_index = index::SecretIndex::shared(store.clone(), requests_tx);
        let ingress_index = index::IngressIndex::shared(ingress_class, annotations_prefix);

        let mut prom = <Registry>::default();
        index::metrics::register(prom.sub_registry_with_prefix("cert_store"), store.clone());
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Spawn resource watches.

        let secrets = runtime.watch_all::<k8s::Secret>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(secret_index.clone(), secrets)
                .instrument(info_span!("secrets")),
        );

        let ingresses = runtime.watch_all::<k8s::Ingress>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(ingress_index.clone(), ingresses)
                .instrument(info_span!("ingresses")),
        );

        // Spawn the certificate controller.
        let controller = index::Controller::new(
            index::Synchronizer::new(
                index::SecretCache::new(secret_index),
                store.clone(),
                ssl_dir.clone(),
                reconfigure_tx.clone(),
            ),
            index::Reconciler::new(index::IngressCache::new(ingress_index)),
            index::ChainCompletion::new(
                store.clone(),
                index::AiaChainResolver::new(http),
                ssl_dir,
                chain_timeout,
                reconfigure_tx,
            ),
            requests_rx,
        );
        tokio::spawn(
            controller
                .run(Duration::from_secs(sync_period), runtime.shutdown_handle())
                .instrument(info_span!("certificates")),
        );

        // The configuration writer lives outside this process; record each reload request.
        tokio::spawn(
            async move {
                while reconfigure_rx.recv().await.is_some() {
                    let records = store.read().len();
                    info!(records, "certificate store changed; reconfiguration requested");
                }
            }
            .instrument(info_span!("reconfigure")),
        );

        if let Some(gate) = gate {
            let drain = runtime.shutdown_handle();
            tokio::spawn(async move {
                if let Err(error) = server::serve(auth_addr, gate, drain).await {
                    tracing::error!(%error, "auth server failed");
                }
            });
        }

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
