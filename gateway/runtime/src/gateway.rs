use crate::{admin, logpipe::LogPipe};
use anyhow::{bail, Context, Result};
use ingress_gateway_core::{ListenPorts, ReverseProxyConfig};
use ingress_gateway_k8s_api::RoutingSource;
use ingress_gateway_k8s_translate::{Translation, Translator};
use ingress_gateway_nginx::{ConfigChange, Manager, Status};
use std::{future::Future, net::SocketAddr, path::PathBuf};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub ports: ListenPorts,
    pub refresh_interval: Duration,
    pub health_addr: SocketAddr,

    /// The FIFO nginx logs to.
    pub log_pipe: PathBuf,
}

/// Keeps nginx's configuration in sync with the cluster's ingresses.
pub struct Gateway<S> {
    source: S,
    translator: Translator,
    manager: Manager,
    config: GatewayConfig,
}

// === impl Gateway ===

impl<S> Gateway<S>
where
    S: RoutingSource + Sync,
{
    pub fn new(
        source: S,
        translator: Translator,
        manager: Manager,
        config: GatewayConfig,
    ) -> Self {
        Self {
            source,
            translator,
            manager,
            config,
        }
    }

    /// Bootstraps nginx and then refreshes its configuration on every interval until `shutdown`
    /// completes.
    ///
    /// Failing to bootstrap is fatal, as is the termination of the health server or the log
    /// pipe. Refresh failures are logged and retried on the next interval.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut logs = LogPipe::create(&self.config.log_pipe)?.spawn();
        if let Err(error) = self.bootstrap().await {
            logs.abort();
            return Err(error);
        }
        let listener = match admin::bind(self.config.health_addr).await {
            Ok(listener) => listener,
            Err(error) => {
                logs.abort();
                return Err(error)
                    .with_context(|| format!("failed to bind {}", self.config.health_addr));
            }
        };
        let mut health = tokio::spawn(admin::serve(listener));

        let mut timer = time::interval(self.config.refresh_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval = ?self.config.refresh_interval, "Watching ingresses");
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let res = self.refresh().instrument(info_span!("refresh")).await;
                    match res {
                        Ok(ConfigChange::Unchanged) => debug!("Configuration unchanged"),
                        Ok(change) => info!(?change, "Applied configuration"),
                        Err(error) => warn!("Refresh failed: {error:#}"),
                    }
                }

                res = &mut health => {
                    logs.abort();
                    return match res {
                        Ok(Ok(())) => bail!("health server terminated"),
                        Ok(Err(error)) => Err(error).context("health server failed"),
                        Err(error) => Err(error).context("health server task failed"),
                    };
                }

                res = &mut logs => {
                    health.abort();
                    return match res {
                        Ok(()) => bail!("log pipe reader terminated"),
                        Err(error) => Err(error).context("log pipe reader task failed"),
                    };
                }

                () = &mut shutdown => {
                    info!("Shutting down");
                    health.abort();
                    logs.abort();
                    return Ok(());
                }
            }
        }
    }

    /// Ensures nginx is running, starting it with only the default servers if it is not.
    async fn bootstrap(&mut self) -> Result<()> {
        match self.manager.status().await {
            Status::Running => {
                info!("nginx is already running");
                return Ok(());
            }
            status => debug!(?status, "nginx is not running"),
        }

        let baseline = ReverseProxyConfig::baseline(&self.config.ports);
        self.manager
            .set_config(&baseline)
            .await
            .context("failed to write baseline configuration")?;
        self.manager.start().await.context("failed to start nginx")?;
        Ok(())
    }

    async fn refresh(&mut self) -> Result<ConfigChange> {
        let Translation { config, errors } = self.translator.translate(&self.source).await?;
        if !errors.is_empty() {
            warn!(skipped = errors.len(), "Some ingresses were not translated");
        }
        let config = config.with_defaults(&self.config.ports);
        let change = self.manager.set_config(&config).await?;
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_gateway_k8s_api::{
        EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Ingress, IngressBackend,
        IngressServiceBackend, IngressSpec, IntOrString, ObjectMeta, Service, ServiceBackendPort,
        ServicePort, ServiceSpec,
    };
    use ingress_gateway_k8s_translate::TranslatorConfig;
    use ingress_gateway_nginx::Settings;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    const PORTS: ListenPorts = ListenPorts {
        http: 7331,
        health: 7332,
    };

    /// A cluster with a single ingress whose listing can be made to fail.
    #[derive(Default)]
    struct Cluster {
        fail: bool,
        lists: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RoutingSource for Cluster {
        async fn ingresses(&self) -> Result<Vec<Ingress>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("connection refused");
            }
            Ok(vec![Ingress {
                metadata: meta("web"),
                spec: Some(IngressSpec {
                    default_backend: Some(IngressBackend {
                        service: Some(IngressServiceBackend {
                            name: "svc1".to_string(),
                            port: Some(ServiceBackendPort {
                                number: Some(80),
                                name: None,
                            }),
                        }),
                        resource: None,
                    }),
                    ..Default::default()
                }),
                status: None,
            }])
        }

        async fn service(&self, _: &str, _: &str) -> Result<Option<Service>> {
            Ok(Some(Service {
                metadata: meta("svc1"),
                spec: Some(ServiceSpec {
                    ports: Some(vec![ServicePort {
                        port: 80,
                        target_port: Some(IntOrString::Int(8080)),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                status: None,
            }))
        }

        async fn endpoints(&self, _: &str, _: &str) -> Result<Option<Endpoints>> {
            Ok(Some(Endpoints {
                metadata: meta("svc1"),
                subsets: Some(vec![EndpointSubset {
                    addresses: Some(vec![EndpointAddress {
                        ip: "10.0.0.5".to_string(),
                        ..Default::default()
                    }]),
                    not_ready_addresses: None,
                    ports: Some(vec![EndpointPort {
                        port: 8080,
                        ..Default::default()
                    }]),
                }]),
            }))
        }
    }

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            namespace: Some("ns1".to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn gateway<S: RoutingSource + Sync>(
        source: S,
        dir: &tempfile::TempDir,
        refresh_interval: Duration,
    ) -> Gateway<S> {
        let translator = Translator::new(TranslatorConfig {
            cluster_zone: "example.com".to_string(),
            listen_port: PORTS.http,
            annotation_prefix: "ingress-gateway".to_string(),
        });
        let manager = Manager::new(Arc::new(Settings::default()), true).unwrap();
        Gateway::new(
            source,
            translator,
            manager,
            GatewayConfig {
                ports: PORTS,
                refresh_interval,
                health_addr: ([127, 0, 0, 1], 0).into(),
                log_pipe: dir.path().join("nginx.fifo"),
            },
        )
    }

    #[tokio::test]
    async fn bootstraps_then_applies_changes_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut gw = gateway(Cluster::default(), &dir, Duration::from_secs(30));
        assert_eq!(gw.manager.status().await, Status::Stopped);

        gw.bootstrap().await.unwrap();
        assert_eq!(gw.manager.status().await, Status::Running);

        assert_eq!(gw.refresh().await.unwrap(), ConfigChange::Reloaded);
        assert_eq!(gw.refresh().await.unwrap(), ConfigChange::Unchanged);
    }

    #[tokio::test]
    async fn bootstrap_leaves_running_nginx_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut gw = gateway(Cluster::default(), &dir, Duration::from_secs(30));
        gw.manager.start().await.unwrap();
        gw.bootstrap().await.unwrap();

        // The baseline was never applied, so the first refresh still writes.
        assert_eq!(gw.refresh().await.unwrap(), ConfigChange::Reloaded);
    }

    #[tokio::test]
    async fn refresh_failures_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Cluster {
            fail: true,
            ..Default::default()
        };
        let gw = gateway(cluster, &dir, Duration::from_millis(10));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let run = tokio::spawn(gw.run(async move {
            let _ = rx.await;
        }));

        time::sleep(Duration::from_millis(100)).await;
        assert!(!run.is_finished());
        tx.send(()).unwrap();
        time::timeout(Duration::from_secs(5), run)
            .await
            .expect("gateway must stop")
            .unwrap()
            .expect("gateway must shut down cleanly");
    }

    /// An nginx binary that records its arguments and always fails validation.
    fn mk_failing_nginx(dir: &tempfile::TempDir) -> Settings {
        use std::os::unix::fs::PermissionsExt;

        let bin = dir.path().join("nginx");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> '{}'
echo 'nginx: [emerg] unknown directive' >&2
exit 1
"#,
            dir.path().join("calls").display()
        );
        std::fs::write(&bin, script).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        Settings {
            binary: bin,
            config_file: dir.path().join("nginx.conf"),
            pid_file: dir.path().join("nginx.pid"),
            command_timeout: Duration::from_secs(10),
            ..Settings::default()
        }
    }

    fn unused_addr() -> SocketAddr {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn failed_bootstrap_is_fatal() {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init()
            .ok();

        let dir = tempfile::tempdir().unwrap();
        let settings = mk_failing_nginx(&dir);
        let mut gw = gateway(Cluster::default(), &dir, Duration::from_secs(30));
        gw.manager = Manager::new(Arc::new(settings), false).unwrap();
        let health_addr = unused_addr();
        gw.config.health_addr = health_addr;

        let res = time::timeout(Duration::from_secs(5), gw.run(std::future::pending()))
            .await
            .expect("gateway must not hang");
        let error = res.expect_err("bootstrap must fail");
        assert!(
            format!("{error:#}").contains("failed to start nginx"),
            "{error:#}"
        );

        // nginx was validated but never launched.
        let calls = std::fs::read_to_string(dir.path().join("calls")).unwrap();
        assert_eq!(calls.lines().count(), 1, "{calls}");
        assert!(calls.trim_end().ends_with("-t"), "{calls}");

        assert!(
            tokio::net::TcpStream::connect(health_addr).await.is_err(),
            "health port must not be bound"
        );
    }

    #[tokio::test]
    async fn log_pipe_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut gw = gateway(Cluster::default(), &dir, Duration::from_secs(30));
        gw.config.log_pipe = dir.path().join("missing").join("nginx.fifo");

        let res = time::timeout(Duration::from_secs(5), gw.run(std::future::pending()))
            .await
            .expect("gateway must not hang");
        let error = res.expect_err("log pipe creation must fail");
        assert!(
            format!("{error:#}").contains("failed to create fifo"),
            "{error:#}"
        );
    }

    #[tokio::test]
    async fn health_bind_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let taken = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let mut gw = gateway(Cluster::default(), &dir, Duration::from_secs(30));
        gw.config.health_addr = taken.local_addr().unwrap();

        let res = time::timeout(Duration::from_secs(5), gw.run(std::future::pending()))
            .await
            .expect("gateway must not hang");
        let error = res.expect_err("bind must fail");
        assert!(
            format!("{error:#}").contains("failed to bind"),
            "{error:#}"
        );
    }

    #[tokio::test]
    async fn refreshes_are_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Cluster {
            fail: true,
            ..Default::default()
        };
        let mut gw = gateway(cluster, &dir, Duration::from_secs(30));
        for _ in 0..3 {
            assert!(gw.refresh().await.is_err());
        }
        assert_eq!(gw.source.lists.load(Ordering::SeqCst), 3);
    }
}
