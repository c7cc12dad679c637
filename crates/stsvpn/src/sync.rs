//! Use cases that keep the database, the on-disk config and the running
//! daemon in step.
//!
//! Lower layers report failures as values; this module decides whether to
//! carry on. A committed database change is never rolled back because a
//! later step failed: the operator fixes the cause and runs `reload`.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::control::{
    DaemonController, DaemonError, DownOutcome, ProcessRunner, TrafficSample, UpOutcome,
    runner::CommandRunner,
};
use crate::form::{FormError, TunnelForm};
use crate::render;
use crate::storage::{Database, DatabaseError, Tunnel};
use crate::writer::{ConfigWriteError, ConfigWriter};

/// Failure of a user-facing operation. `Display` is meant for operators.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Invalid tunnel settings: {0}")]
    Validation(#[from] FormError),

    #[error("Tunnel {0} does not exist")]
    NotFound(i64),

    #[error("A tunnel named '{0}' already exists")]
    DuplicateName(String),

    #[error("Tunnel database error: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("VPN configuration could not be written, please retry: {0}")]
    ConfigWrite(#[from] ConfigWriteError),

    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// A tunnel as listed to operators, with its live state when requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunnelView {
    #[serde(flatten)]
    pub tunnel: Tunnel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
}

/// What happened to the live tunnel while deleting its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// The tunnel was not up.
    NotNeeded,
    /// The tunnel was brought down.
    Closed,
    /// Bringing the tunnel down failed; deletion went ahead regardless.
    Failed(String),
}

/// Outcome of [`SyncOrchestrator::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub tunnel: Tunnel,
    pub teardown: Teardown,
}

/// Sequences store, renderer, writer and daemon for each operation.
pub struct SyncOrchestrator<R = ProcessRunner> {
    db: Database,
    writer: ConfigWriter,
    controller: DaemonController<R>,
}

impl<R: CommandRunner> SyncOrchestrator<R> {
    pub const fn new(db: Database, writer: ConfigWriter, controller: DaemonController<R>) -> Self {
        Self {
            db,
            writer,
            controller,
        }
    }

    pub const fn controller(&self) -> &DaemonController<R> {
        &self.controller
    }

    pub const fn db(&self) -> &Database {
        &self.db
    }

    async fn tunnel(&self, id: i64) -> Result<Tunnel, SyncError> {
        self.db.get_tunnel(id).await.map_err(|e| match e {
            DatabaseError::NotFound(_) => SyncError::NotFound(id),
            other => SyncError::Persistence(other),
        })
    }

    /// Create or update a tunnel, then reload the daemon.
    ///
    /// A name already held by another tunnel is rejected before anything is
    /// written.
    pub async fn save(&self, tunnel_id: Option<i64>, form: &TunnelForm) -> Result<Tunnel, SyncError> {
        form.validate()?;

        if let Some(holder) = self.db.get_tunnel_by_name(&form.name).await?
            && Some(holder.id) != tunnel_id
        {
            return Err(SyncError::DuplicateName(form.name.clone()));
        }

        let tunnel = self
            .db
            .upsert_tunnel(tunnel_id, &form.name, &form.to_rules(), &form.psk)
            .await?;
        info!(tunnel_id = tunnel.id, tunnel = %tunnel.name, "Tunnel saved");

        self.reload().await?;
        Ok(tunnel)
    }

    /// Delete a tunnel, bringing it down first if it is up, then reload.
    ///
    /// The config is about to lose the tunnel's stanza, so a live instance
    /// must go first. If that fails the deletion still proceeds; the report
    /// carries the teardown failure.
    pub async fn delete(&self, tunnel_id: i64) -> Result<DeleteReport, SyncError> {
        let tunnel = self.tunnel(tunnel_id).await?;

        let teardown = match self.controller.tunnel_down(&tunnel.name).await {
            Ok(DownOutcome::AlreadyDown) => Teardown::NotNeeded,
            Ok(DownOutcome::Closed) => Teardown::Closed,
            Err(e) => {
                warn!(tunnel = %tunnel.name, error = %e, "Could not bring tunnel down before deletion");
                Teardown::Failed(e.to_string())
            }
        };

        self.db.delete_tunnel(tunnel_id).await?;
        info!(tunnel_id, tunnel = %tunnel.name, "Tunnel deleted");

        self.reload().await?;
        Ok(DeleteReport { tunnel, teardown })
    }

    /// Regenerate both files from the database and make the daemon re-read them.
    ///
    /// The daemon is not touched when the files cannot be written.
    pub async fn reload(&self) -> Result<(), SyncError> {
        let tunnels = self.db.list_tunnels().await?;
        let rendered = render::render(&tunnels);

        if let Err(e) = self.writer.write(&rendered) {
            error!(error = %e, "VPN config sync failed; daemon not reloaded");
            return Err(e.into());
        }

        self.controller.apply_config().await?;
        info!(tunnels = tunnels.len(), "VPN configuration applied");
        Ok(())
    }

    /// One tunnel or all of them, optionally with their live state.
    pub async fn get_tunnels(
        &self,
        tunnel_id: Option<i64>,
        with_status: bool,
    ) -> Result<Vec<TunnelView>, SyncError> {
        let tunnels = match tunnel_id {
            Some(id) => vec![self.tunnel(id).await?],
            None => self.db.list_tunnels().await?,
        };

        let mut views = Vec::with_capacity(tunnels.len());
        for tunnel in tunnels {
            let status = if with_status {
                Some(self.controller.is_tunnel_up(&tunnel.name).await)
            } else {
                None
            };
            views.push(TunnelView { tunnel, status });
        }
        Ok(views)
    }

    /// Bring a stored tunnel up.
    pub async fn tunnel_up(&self, tunnel_id: i64) -> Result<(Tunnel, UpOutcome), SyncError> {
        let tunnel = self.tunnel(tunnel_id).await?;
        let outcome = self.controller.tunnel_up(&tunnel.name).await?;
        Ok((tunnel, outcome))
    }

    /// Bring a stored tunnel down.
    pub async fn tunnel_down(&self, tunnel_id: i64) -> Result<(Tunnel, DownOutcome), SyncError> {
        let tunnel = self.tunnel(tunnel_id).await?;
        let outcome = self.controller.tunnel_down(&tunnel.name).await?;
        Ok((tunnel, outcome))
    }

    /// Sample a stored tunnel's traffic counters.
    pub async fn tunnel_traffic(&self, tunnel_id: i64) -> Result<(Tunnel, TrafficSample), SyncError> {
        let tunnel = self.tunnel(tunnel_id).await?;
        let sample = self.controller.tunnel_traffic(&tunnel.name).await?;
        Ok((tunnel, sample))
    }
}
