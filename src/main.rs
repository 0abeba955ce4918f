//! Strata controller - multi-tenant quota governance for Kubernetes

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strata::cluster::{KubeQuotaClient, QuotaClient};
use strata::controller::{leaf, tree, LeafContext, TreeContext};
use strata::crd::{LeafQuota, TreeQuota};
use strata::webhook::{webhook_router, WebhookState};
use strata::FIELD_MANAGER;

/// Strata - multi-tenant control plane with hierarchical quota governance
#[derive(Parser, Debug)]
#[command(name = "strata", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// In the pivot cluster this watches TreeQuota objects and serves their
    /// validating webhook. In a member cluster it watches LeafQuota objects,
    /// serves their webhook, and talks to the pivot cluster for parent
    /// resolution and usage propagation.
    Controller(ControllerArgs),
}

/// Which part of the control plane this process runs in
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    /// The central control-plane cluster holding the quota tree
    Pivot,
    /// A workload cluster holding namespace-scoped leaf quotas
    Member,
}

/// Controller mode arguments
#[derive(Parser, Debug)]
struct ControllerArgs {
    /// Role of this cluster in the control plane
    #[arg(long, value_enum, env = "STRATA_ROLE", default_value = "pivot")]
    role: Role,

    /// Kubeconfig for reaching the pivot cluster (member role only)
    #[arg(long, env = "STRATA_PIVOT_KUBECONFIG")]
    pivot_kubeconfig: Option<PathBuf>,

    /// Bind address for the validating webhook server
    #[arg(long, env = "STRATA_WEBHOOK_ADDR", default_value = "0.0.0.0:8443")]
    webhook_addr: SocketAddr,

    /// TLS certificate for the webhook server
    #[arg(long, env = "STRATA_TLS_CERT", default_value = "/etc/strata/tls/tls.crt")]
    tls_cert: PathBuf,

    /// TLS private key for the webhook server
    #[arg(long, env = "STRATA_TLS_KEY", default_value = "/etc/strata/tls/tls.key")]
    tls_key: PathBuf,

    /// Namespace the webhook Service lives in
    #[arg(long, env = "STRATA_NAMESPACE", default_value = "strata-system")]
    namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install the process-wide TLS provider before anything touches rustls.
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("CRITICAL: failed to install the default crypto provider");
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let tree_crd = serde_yaml::to_string(&TreeQuota::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize TreeQuota CRD: {}", e))?;
        let leaf_crd = serde_yaml::to_string(&LeafQuota::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize LeafQuota CRD: {}", e))?;
        println!("{tree_crd}---\n{leaf_crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(ControllerArgs::parse_from(["strata"])).await,
    }
}

/// Build a client for the pivot cluster from an explicit kubeconfig.
async fn pivot_client(path: &PathBuf) -> anyhow::Result<Client> {
    let kubeconfig = kube::config::Kubeconfig::read_from(path)
        .map_err(|e| anyhow::anyhow!("Failed to read pivot kubeconfig {:?}: {}", path, e))?;
    let config = kube::Config::from_custom_kubeconfig(
        kubeconfig,
        &kube::config::KubeConfigOptions::default(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to load pivot kubeconfig {:?}: {}", path, e))?;
    Ok(Client::try_from(config)?)
}

/// Ensure the CRDs this role watches are installed
///
/// The controller installs its own CRDs on startup using server-side apply,
/// so CRD versions always match the controller version.
async fn ensure_crds_installed(client: &Client, role: Role) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    match role {
        Role::Pivot => {
            tracing::info!("Installing TreeQuota CRD...");
            crds.patch(
                "treequotas.strata.dev",
                &params,
                &Patch::Apply(&TreeQuota::crd()),
            )
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install TreeQuota CRD: {}", e))?;
        }
        Role::Member => {
            tracing::info!("Installing LeafQuota CRD...");
            crds.patch(
                "leafquotas.strata.dev",
                &params,
                &Patch::Apply(&LeafQuota::crd()),
            )
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install LeafQuota CRD: {}", e))?;
        }
    }

    tracing::info!("CRDs installed/updated");
    Ok(())
}

/// Ensure the webhook Service and ValidatingWebhookConfiguration exist
async fn ensure_webhook_config(
    client: &Client,
    role: Role,
    namespace: &str,
    tls_cert: &PathBuf,
    webhook_port: u16,
) -> anyhow::Result<()> {
    use k8s_openapi::api::admissionregistration::v1::{
        RuleWithOperations, ServiceReference, ValidatingWebhook, ValidatingWebhookConfiguration,
        WebhookClientConfig,
    };
    use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    let params = PatchParams::apply(FIELD_MANAGER).force();

    // ClusterIP Service exposing the webhook endpoint to the API server.
    let webhook_service = Service {
        metadata: kube::api::ObjectMeta {
            name: Some("strata-webhook".to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(std::collections::BTreeMap::from([(
                "app".to_string(),
                "strata-controller".to_string(),
            )])),
            ports: Some(vec![ServicePort {
                name: Some("https".to_string()),
                port: 443,
                target_port: Some(IntOrString::Int(webhook_port as i32)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    services
        .patch("strata-webhook", &params, &Patch::Apply(&webhook_service))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create webhook Service: {}", e))?;

    // The API server verifies the webhook with the serving certificate.
    let ca_bundle = tokio::fs::read(tls_cert)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read TLS certificate {:?}: {}", tls_cert, e))?;

    let (config_name, webhook_name, path, resources, scope) = match role {
        Role::Pivot => (
            "strata-treequota-validator",
            "treequotas.strata.dev",
            "/validate/treequotas",
            "treequotas",
            "Cluster",
        ),
        Role::Member => (
            "strata-leafquota-validator",
            "leafquotas.strata.dev",
            "/validate/leafquotas",
            "leafquotas",
            "Namespaced",
        ),
    };

    let webhook_config = ValidatingWebhookConfiguration {
        metadata: kube::api::ObjectMeta {
            name: Some(config_name.to_string()),
            ..Default::default()
        },
        webhooks: Some(vec![ValidatingWebhook {
            name: webhook_name.to_string(),
            admission_review_versions: vec!["v1".to_string()],
            // Propagation is skipped for dry-run requests.
            side_effects: "NoneOnDryRun".to_string(),
            failure_policy: Some("Fail".to_string()),
            match_policy: Some("Equivalent".to_string()),
            rules: Some(vec![RuleWithOperations {
                operations: Some(vec![
                    "CREATE".to_string(),
                    "UPDATE".to_string(),
                    "DELETE".to_string(),
                ]),
                api_groups: Some(vec!["strata.dev".to_string()]),
                api_versions: Some(vec!["v1alpha1".to_string()]),
                resources: Some(vec![resources.to_string()]),
                scope: Some(scope.to_string()),
            }]),
            client_config: WebhookClientConfig {
                service: Some(ServiceReference {
                    name: "strata-webhook".to_string(),
                    namespace: namespace.to_string(),
                    path: Some(path.to_string()),
                    port: Some(443),
                }),
                ca_bundle: Some(k8s_openapi::ByteString(ca_bundle)),
                ..Default::default()
            },
            ..Default::default()
        }]),
    };

    let webhooks: Api<ValidatingWebhookConfiguration> = Api::all(client.clone());
    webhooks
        .patch(config_name, &params, &Patch::Apply(&webhook_config))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create ValidatingWebhookConfiguration: {}", e))?;

    tracing::info!(name = config_name, "Webhook configuration installed");
    Ok(())
}

/// Run in controller mode - serves the webhook and runs the reconciler for
/// this cluster's role.
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!(role = ?args.role, "Strata controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client, args.role).await?;

    // Local handle always wraps the in-cluster client; the pivot handle is
    // the same client in the pivot cluster and a kubeconfig-built client in
    // member clusters.
    let local: Arc<dyn QuotaClient> = Arc::new(KubeQuotaClient::new(client.clone()));
    let pivot: Arc<dyn QuotaClient> = match args.role {
        Role::Pivot => local.clone(),
        Role::Member => {
            let path = args.pivot_kubeconfig.as_ref().ok_or_else(|| {
                anyhow::anyhow!("--pivot-kubeconfig is required when running as a member")
            })?;
            Arc::new(KubeQuotaClient::new(pivot_client(path).await?))
        }
    };

    // Webhook server, TLS terminated in-process.
    let state = Arc::new(WebhookState::new(pivot.clone(), local.clone()));
    let router = webhook_router(state);
    let tls_config =
        axum_server::tls_rustls::RustlsConfig::from_pem_file(&args.tls_cert, &args.tls_key)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load webhook TLS material: {}", e))?;
    let webhook_addr = args.webhook_addr;
    let webhook_server = tokio::spawn(async move {
        tracing::info!(addr = %webhook_addr, "webhook server listening");
        if let Err(e) = axum_server::bind_rustls(webhook_addr, tls_config)
            .serve(router.into_make_service())
            .await
        {
            tracing::error!(error = %e, "webhook server exited");
        }
    });

    ensure_webhook_config(
        &client,
        args.role,
        &args.namespace,
        &args.tls_cert,
        args.webhook_addr.port(),
    )
    .await?;

    match args.role {
        Role::Pivot => {
            let trees: Api<TreeQuota> = Api::all(client.clone());
            let ctx = Arc::new(TreeContext::new(pivot));

            tracing::info!("Starting TreeQuota controller");
            let controller = Controller::new(trees, WatcherConfig::default())
                .shutdown_on_signal()
                .run(tree::reconcile, tree::error_policy, ctx)
                .for_each(|result| async move {
                    match result {
                        Ok(action) => {
                            tracing::debug!(?action, "TreeQuota reconciliation completed");
                        }
                        Err(e) => {
                            tracing::error!(error = ?e, "TreeQuota reconciliation error");
                        }
                    }
                });

            tokio::select! {
                _ = controller => tracing::info!("TreeQuota controller completed"),
                _ = webhook_server => tracing::info!("webhook server completed"),
            }
        }
        Role::Member => {
            let leaves: Api<LeafQuota> = Api::all(client.clone());
            let ctx = Arc::new(LeafContext::new(pivot, local));

            tracing::info!("Starting LeafQuota controller");
            let controller = Controller::new(leaves, WatcherConfig::default())
                .shutdown_on_signal()
                .run(leaf::reconcile, leaf::error_policy, ctx)
                .for_each(|result| async move {
                    match result {
                        Ok(action) => {
                            tracing::debug!(?action, "LeafQuota reconciliation completed");
                        }
                        Err(e) => {
                            tracing::error!(error = ?e, "LeafQuota reconciliation error");
                        }
                    }
                });

            tokio::select! {
                _ = controller => tracing::info!("LeafQuota controller completed"),
                _ = webhook_server => tracing::info!("webhook server completed"),
            }
        }
    }

    tracing::info!("Strata controller shutting down");
    Ok(())
}
