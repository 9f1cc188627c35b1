use crate::{
    duration::Interval,
    gateway::{Gateway, GatewayConfig},
};
use anyhow::Result;
use clap::Parser;
use ingress_gateway_core::ListenPorts;
use ingress_gateway_k8s_api::annotations;
use ingress_gateway_k8s_translate::{Translator, TranslatorConfig};
use ingress_gateway_nginx::{Manager, Settings};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[clap(
    name = "ingress-gateway",
    about = "Keeps an nginx reverse proxy in sync with Kubernetes ingresses"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "ingress_gateway=info,nginx=info,warn",
        env = "INGRESS_GATEWAY_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain", env = "INGRESS_GATEWAY_LOG_FORMAT")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// How often ingresses are re-read and nginx's configuration refreshed.
    #[clap(long, default_value = "30s", env = "INGRESS_GATEWAY_REFRESH_INTERVAL")]
    refresh_interval: Interval,

    /// DNS zone under which each ingress is served as `<name>.<namespace>.<zone>`.
    #[clap(long, env = "INGRESS_GATEWAY_CLUSTER_ZONE")]
    cluster_zone: String,

    /// Prefix of the annotations read from ingresses.
    #[clap(
        long,
        default_value = annotations::DEFAULT_PREFIX,
        env = "INGRESS_GATEWAY_ANNOTATION_PREFIX"
    )]
    annotation_prefix: String,

    /// Port on which nginx accepts routed HTTP traffic.
    #[clap(long, default_value = "7331", env = "INGRESS_GATEWAY_HTTP_LISTEN_PORT")]
    http_listen_port: u16,

    /// Port on which nginx answers its own health checks.
    #[clap(long, default_value = "7332", env = "INGRESS_GATEWAY_NGINX_HEALTH_PORT")]
    nginx_health_port: u16,

    /// Address of the gateway's own health server.
    #[clap(long, default_value = "0.0.0.0:7333", env = "INGRESS_GATEWAY_HEALTH_ADDR")]
    health_addr: SocketAddr,

    /// Named pipe through which nginx's logs are collected.
    #[clap(long, default_value = "/nginx.fifo", env = "INGRESS_GATEWAY_FIFO_PATH")]
    fifo_path: PathBuf,

    #[clap(long, default_value = "nginx", env = "INGRESS_GATEWAY_NGINX_BINARY")]
    nginx_binary: PathBuf,

    #[clap(
        long,
        default_value = "/etc/nginx/nginx.conf",
        env = "INGRESS_GATEWAY_NGINX_CONFIG_FILE"
    )]
    nginx_config_file: PathBuf,

    #[clap(
        long,
        default_value = "/var/run/nginx.pid",
        env = "INGRESS_GATEWAY_NGINX_PID_FILE"
    )]
    nginx_pid_file: PathBuf,

    #[clap(
        long,
        default_value = "512",
        env = "INGRESS_GATEWAY_NGINX_WORKER_CONNECTIONS"
    )]
    nginx_worker_connections: u32,

    /// Bounds each invocation of the nginx binary.
    #[clap(
        long,
        default_value = "30s",
        env = "INGRESS_GATEWAY_NGINX_COMMAND_TIMEOUT"
    )]
    nginx_command_timeout: Interval,

    /// Logs configuration changes instead of writing them and never runs nginx.
    #[clap(long, env = "INGRESS_GATEWAY_NGINX_DRY_RUN")]
    nginx_dry_run: bool,
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
            refresh_interval,
            cluster_zone,
            annotation_prefix,
            http_listen_port,
            nginx_health_port,
            health_addr,
            fifo_path,
            nginx_binary,
            nginx_config_file,
            nginx_pid_file,
            nginx_worker_connections,
            nginx_command_timeout,
            nginx_dry_run,
        } = self;

        log_format.try_init(log_level)?;
        let (shutdown, _) = kubert::shutdown::sigint_or_sigterm()?;
        let client = client.try_client().await?;

        // nginx's logs are collected through the pipe.
        let log_path = fifo_path.display().to_string();
        let settings = Arc::new(Settings {
            binary: nginx_binary,
            config_file: nginx_config_file,
            pid_file: nginx_pid_file,
            error_log: log_path.clone(),
            access_log: log_path,
            worker_connections: nginx_worker_connections,
            command_timeout: nginx_command_timeout.into(),
        });
        if nginx_dry_run {
            info!("Dry run; nginx will not be started or reloaded");
        }
        let manager = Manager::new(settings, nginx_dry_run)?;

        let translator = Translator::new(TranslatorConfig {
            cluster_zone,
            listen_port: http_listen_port,
            annotation_prefix,
        });

        let gateway = Gateway::new(
            client,
            translator,
            manager,
            GatewayConfig {
                ports: ListenPorts {
                    http: http_listen_port,
                    health: nginx_health_port,
                },
                refresh_interval: refresh_interval.into(),
                health_addr,
                log_pipe: fifo_path,
            },
        );

        gateway
            .run(async move {
                if shutdown.signaled().await.is_err() {
                    warn!("Shutdown aborted");
                }
            })
            .await
    }
}
