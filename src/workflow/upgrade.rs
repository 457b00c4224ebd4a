//! Cluster upgrade to a destination version.

use tracing::debug;

use super::{orchestrate_pillar, orchestrate_step};
use crate::checkpoint::{Step, StepOutcome};
use crate::salt::SaltClient;
use crate::salt::runner::CommandRunner;

pub const SYNC_MODULES: &str = "sync-modules";
pub const PRECHECK: &str = "precheck";
pub const UPGRADE_ENGINES: &str = "upgrade-engines";
pub const UPGRADE_ETCD: &str = "upgrade-etcd";
pub const UPGRADE_NODES: &str = "upgrade-nodes";
pub const POST_UPGRADE: &str = "post-upgrade";

pub const STEPS: &[&str] = &[
    SYNC_MODULES,
    PRECHECK,
    UPGRADE_ENGINES,
    UPGRADE_ETCD,
    UPGRADE_NODES,
    POST_UPGRADE,
];

const PRECHECK_SLS: &str = "orchestrate.upgrade.precheck";
const ENGINES_SLS: &str = "roles.bootstrap.engines";
const ETCD_SLS: &str = "orchestrate.upgrade.etcd";
const NODES_SLS: &str = "orchestrate.upgrade";
const POST_UPGRADE_SLS: &str = "orchestrate.upgrade.post";

/// Build the upgrade steps for `dest_version`.
///
/// Modules are synced first so the master runs the destination version's
/// states. The engines on the bootstrap host are upgraded with the local
/// agent before etcd and the nodes.
pub fn steps<'a, R: CommandRunner + 'a>(
    client: &'a SaltClient<R>,
    dest_version: &str,
) -> Vec<Step<'a>> {
    let pillar = orchestrate_pillar(dest_version);
    let engines_pillar = pillar.clone();

    vec![
        Step::new(SYNC_MODULES, move |_| async move {
            let synced = client.runner("saltutil.sync_all", &[]).await?;
            debug!("Synced modules: {}", synced);
            Ok(StepOutcome::Ran)
        }),
        orchestrate_step(PRECHECK, client, PRECHECK_SLS, Some(pillar.clone())),
        Step::new(UPGRADE_ENGINES, move |_| {
            let pillar = engines_pillar.clone();
            async move {
                client.local_state_apply(ENGINES_SLS, Some(pillar)).await?;
                Ok(StepOutcome::Ran)
            }
        }),
        orchestrate_step(UPGRADE_ETCD, client, ETCD_SLS, Some(pillar.clone())),
        orchestrate_step(UPGRADE_NODES, client, NODES_SLS, Some(pillar.clone())),
        orchestrate_step(POST_UPGRADE, client, POST_UPGRADE_SLS, Some(pillar)),
    ]
}
