use crate::{ChainCompletion, Reconciler, ResolveChain, SyncRequest, Synchronizer};
use ingress_controller_core::{IngressRuleProvider, SecretProvider};
use tokio::{sync::mpsc::UnboundedReceiver, time};
use tracing::{debug, info};

/// Drives certificate synchronization from a single task.
///
/// Secret watch events arrive as [`SyncRequest`]s; on every tick of the sweep interval, missing
/// secrets are reconciled and then incomplete chains are completed. Requests and shutdown are
/// still handled while a sweep is waiting on chain resolution.
pub struct Controller<S, I, R> {
    sync: Synchronizer<S>,
    reconciler: Reconciler<I>,
    chains: ChainCompletion<R>,
    requests: UnboundedReceiver<SyncRequest>,
}

impl<S, I, R> Controller<S, I, R>
where
    S: SecretProvider,
    I: IngressRuleProvider,
    R: ResolveChain,
{
    pub fn new(
        sync: Synchronizer<S>,
        reconciler: Reconciler<I>,
        chains: ChainCompletion<R>,
        requests: UnboundedReceiver<SyncRequest>,
    ) -> Self {
        Self {
            sync,
            reconciler,
            chains,
            requests,
        }
    }

    /// Handles a single request from the secret index.
    pub fn process(&self, req: SyncRequest) {
        process(&self.sync, req)
    }

    /// Runs one sweep: reconciles missing secrets, then completes chains.
    pub async fn sweep(&self) {
        sweep(&self.sync, &self.reconciler, &self.chains).await
    }

    pub async fn run(self, period: time::Duration, drain: drain::Watch) {
        let Self {
            sync,
            reconciler,
            chains,
            mut requests,
        } = self;

        // The first sweep starts immediately; later ones start a full period after the previous
        // tick, and never overlap.
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut sweeping = Some(Box::pin(sweep(&sync, &reconciler, &chains)));

        let shutdown = drain.signaled();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                release = &mut shutdown => {
                    info!("certificate controller shutting down");
                    drop(release);
                    return;
                }

                req = requests.recv() => match req {
                    Some(req) => process(&sync, req),
                    None => {
                        info!("secret index closed");
                        return;
                    }
                },

                () = async {
                    if let Some(sweep) = sweeping.as_mut() {
                        sweep.await
                    }
                }, if sweeping.is_some() => sweeping = None,

                _ = interval.tick(), if sweeping.is_none() => {
                    sweeping = Some(Box::pin(sweep(&sync, &reconciler, &chains)));
                }
            }
        }
    }
}

fn process<S: SecretProvider>(sync: &Synchronizer<S>, req: SyncRequest) {
    match req {
        SyncRequest::Sync(id) => sync.sync(&id),
        SyncRequest::Remove(id) => {
            sync.remove(&id);
        }
    }
}

async fn sweep<S, I, R>(
    sync: &Synchronizer<S>,
    reconciler: &Reconciler<I>,
    chains: &ChainCompletion<R>,
) where
    S: SecretProvider,
    I: IngressRuleProvider,
    R: ResolveChain,
{
    let synced = reconciler.reconcile(sync);
    let completed = chains.complete_chains().await;
    debug!(synced, completed, "sweep complete");
}
