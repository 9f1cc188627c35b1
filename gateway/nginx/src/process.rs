use crate::{ConfigChange, Error, Renderer, Settings, Status};
use ingress_gateway_core::ReverseProxyConfig;
use std::{io, process::Stdio, sync::Arc};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncSeekExt},
    process::Command,
    time,
};
use tracing::{debug, info, trace, warn};

/// Manages a real nginx process through its binary and pid file.
#[derive(Debug)]
pub struct NginxManager {
    settings: Arc<Settings>,
    renderer: Renderer,

    /// Set while the file on disk may hold a configuration the running process has not loaded.
    pending_reload: bool,
}

// === impl NginxManager ===

impl NginxManager {
    pub fn new(settings: Arc<Settings>) -> Result<Self, Error> {
        Ok(Self {
            renderer: Renderer::new()?,
            settings,
            // A process started before us may not have loaded what is on disk.
            pending_reload: true,
        })
    }

    /// Determines whether nginx is running from its pid file.
    ///
    /// A missing file means nginx is stopped. A file that cannot be read or does not hold a pid
    /// is [`Status::Unknown`], which callers must not treat as running.
    pub async fn status(&self) -> Status {
        let path = &self.settings.pid_file;
        match fs::read_to_string(path).await {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(pid) => {
                    trace!(pid, "nginx is running");
                    Status::Running
                }
                Err(error) => {
                    warn!(%error, path = %path.display(), "Invalid pid file");
                    Status::Unknown
                }
            },
            Err(error) if error.kind() == io::ErrorKind::NotFound => Status::Stopped,
            Err(error) => {
                warn!(%error, path = %path.display(), "Failed to read pid file");
                Status::Unknown
            }
        }
    }

    /// Writes `config` if its rendering differs from the file on disk and reloads a running
    /// process.
    ///
    /// A file that was written but not loaded, because validation or the reload failed, is
    /// validated and reloaded again on the next call even when its contents are unchanged.
    pub async fn set_config(
        &mut self,
        config: &ReverseProxyConfig,
    ) -> Result<ConfigChange, Error> {
        config.validate()?;
        let rendered = self.renderer.render(config, &self.settings)?;

        let path = &self.settings.config_file;
        let unchanged = match fs::read(path).await {
            Ok(current) => current == rendered,
            Err(error) if error.kind() == io::ErrorKind::NotFound => false,
            Err(error) => {
                debug!(%error, path = %path.display(), "Failed to read configuration");
                false
            }
        };
        if unchanged && !self.pending_reload {
            debug!(path = %path.display(), "Configuration unchanged");
            return Ok(ConfigChange::Unchanged);
        }

        if !unchanged {
            fs::write(path, &rendered)
                .await
                .map_err(|source| Error::Write {
                    path: path.clone(),
                    source,
                })?;
            info!(path = %path.display(), bytes = rendered.len(), "Wrote configuration");
        }

        if self.status().await != Status::Running {
            self.pending_reload = false;
            return Ok(if unchanged {
                ConfigChange::Unchanged
            } else {
                ConfigChange::Written
            });
        }

        self.pending_reload = true;
        self.run(&["-t"]).await?;
        self.run(&["-s", "reload"]).await?;
        self.pending_reload = false;
        info!("Reloaded nginx");
        Ok(ConfigChange::Reloaded)
    }

    /// Validates the current configuration and launches nginx.
    pub async fn start(&mut self) -> Result<(), Error> {
        self.run(&["-t"]).await?;

        let mut cmd = self.command(&[]);
        let args = display(&cmd);
        // The daemonized master may keep its stderr open, so it is captured in a file rather
        // than a pipe that would never reach EOF.
        let stderr = tempfile::tempfile().map_err(|source| Error::Exec {
            args: args.clone(),
            source,
        })?;
        let child_stderr = stderr.try_clone().map_err(|source| Error::Exec {
            args: args.clone(),
            source,
        })?;
        cmd.stdout(Stdio::null()).stderr(child_stderr);
        let status = time::timeout(self.settings.command_timeout, cmd.status())
            .await
            .map_err(|_| Error::Timeout {
                args: args.clone(),
                timeout: self.settings.command_timeout,
            })?
            .map_err(|source| Error::Exec {
                args: args.clone(),
                source,
            })?;
        if !status.success() {
            return Err(Error::Failed {
                args,
                status,
                output: read_output(stderr).await,
            });
        }

        info!(binary = %self.settings.binary.display(), "Started nginx");
        Ok(())
    }

    /// Runs the nginx binary against the configuration file, returning its combined output.
    async fn run(&self, args: &[&str]) -> Result<String, Error> {
        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        let args = display(&cmd);
        debug!(%args, "Running nginx");

        let output = time::timeout(self.settings.command_timeout, cmd.output())
            .await
            .map_err(|_| Error::Timeout {
                args: args.clone(),
                timeout: self.settings.command_timeout,
            })?
            .map_err(|source| Error::Exec {
                args: args.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim().to_string();
        if !output.status.success() {
            return Err(Error::Failed {
                args,
                status: output.status,
                output: combined,
            });
        }
        trace!(%args, output = %combined);
        Ok(combined)
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.settings.binary);
        cmd.arg("-c")
            .arg(&self.settings.config_file)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

fn display(cmd: &Command) -> String {
    cmd.as_std()
        .get_args()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn read_output(file: std::fs::File) -> String {
    let mut file = fs::File::from_std(file);
    let mut buf = Vec::new();
    let res = async {
        file.seek(io::SeekFrom::Start(0)).await?;
        file.read_to_end(&mut buf).await
    }
    .await;
    if let Err(error) = res {
        debug!(%error, "Failed to read nginx output");
    }
    String::from_utf8_lossy(&buf).trim().to_string()
}
