//! Orchestrator (C6, spec.md §4.6): drives one `load(origin)` visit end to
//! end — list versions, fetch/unpack/content-address each artifact, stage
//! the resulting objects, assemble a Snapshot, and record a terminal
//! `OriginVisitStatus`.
//!
//! Grounded on the overall shape of `package_managers/parallel_sync.rs`
//! (spawns one task per unit of work, collects results, aggregates
//! errors) and `daemon/handlers.rs` (single entry point coordinating
//! several subsystems behind one call). Per-artifact concurrency within a
//! version uses a semaphore instead of the teacher's raw `tokio::spawn` +
//! `JoinHandle` collection, since this crate also needs a hard concurrency
//! cap (spec.md §5, default 4) rather than "spawn everything".

use crate::adapters::{Adapter, ExtidKey, PackageInfo};
use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::failures::FailureLedger;
use crate::fetch::{random_jitter, Fetcher, RetryPolicy, Transport};
use crate::hash;
use crate::model::{
    BranchTarget, Content, Directory, ExtID, ExtidTargetType, Origin, OriginVisit,
    OriginVisitStatus, Release, Sha1Git, Snapshot, VisitStatus, VisitType,
};
use crate::store::ObjectStore;
use crate::staging::Staging;
use crate::visit_state::VisitStateMachine;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use url::Url;

/// Cooperative cancellation signal for an in-flight visit. Checked between
/// versions and between artifacts (spec.md §5: "cancellation honored at
/// every suspension point"); a cancelled visit still runs step 8 (scratch
/// dir cleanup) and writes a best-effort `failed` status.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters describing what a visit actually did, independent of its
/// terminal `VisitStatus` (spec.md Open Question 2: "uneventful vs full").
#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    pub branches_succeeded: usize,
    pub branches_reused: usize,
    pub branches_failed: usize,
    pub branches_skipped: usize,
}

/// Outcome of one `Orchestrator::load` call. Never a `Result` — per
/// spec.md §7 ("no exception escapes `load(origin)`"), every failure mode
/// is represented as a terminal `VisitStatus` instead of a returned error.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub visit_id: u64,
    pub status: VisitStatus,
    pub uneventful: bool,
    pub snapshot_id: Option<Sha1Git>,
    pub stats: LoadStats,
    pub failures: Vec<crate::failures::FailureRecord>,
}

/// One branch's resolved artifact, ready to stage.
struct FreshArtifact {
    branch: Vec<u8>,
    contents: Vec<Content>,
    directories: Vec<(Sha1Git, Directory)>,
    release: (Sha1Git, Release),
    extid: Option<ExtID>,
}

enum BranchOutcome {
    Fresh(FreshArtifact),
    Reused { branch: Vec<u8>, release_id: Sha1Git },
    /// `build_release` returned `Ok(None)`: the adapter declined to
    /// synthesise a release for this artifact. Not a failure.
    Declined,
    Failed {
        branch: Vec<u8>,
        url: Option<String>,
        err: LoaderError,
    },
    Cancelled,
}

struct VisitOutcome {
    snapshot: Snapshot,
    stats: LoadStats,
    new_objects_written: bool,
    cancelled: bool,
    extids: Vec<ExtID>,
}

/// Drives visits against one `ObjectStore`/`Fetcher` pair. Holds no
/// per-visit state itself — every `load()` call is an independent logical
/// task (spec.md §5), so an `Orchestrator` is freely shared across
/// concurrent visits of different origins.
pub struct Orchestrator<S: ObjectStore, T: Transport> {
    store: Arc<S>,
    fetcher: Arc<Fetcher<T>>,
    config: LoaderConfig,
    scratch_root: PathBuf,
    next_scratch_id: AtomicU64,
}

impl<S, T> Orchestrator<S, T>
where
    S: ObjectStore + 'static,
    T: Transport + 'static,
{
    #[must_use]
    pub fn new(store: Arc<S>, fetcher: Arc<Fetcher<T>>, config: LoaderConfig, scratch_root: PathBuf) -> Self {
        Self {
            store,
            fetcher,
            config,
            scratch_root,
            next_scratch_id: AtomicU64::new(0),
        }
    }

    /// Run one visit of `origin_url` to completion. Always returns a
    /// `LoadResult` with a terminal `VisitStatus`; this call never panics
    /// and never propagates an error to the caller (spec.md §7/§4.8).
    pub async fn load(&self, origin_url: Url, visit_type: VisitType, visit_id: u64, cancel: &CancelToken) -> LoadResult {
        let origin = Origin::new(origin_url.clone());
        let mut state = VisitStateMachine::new();

        if let Err(e) = self.store.origin_add(&origin).await {
            warn!(%origin_url, error = %e, "failed to record origin, aborting visit before it starts");
            return self.empty_result(visit_id, VisitStatus::Failed);
        }

        let visit = OriginVisit {
            origin: origin_url.clone(),
            visit_id,
            visit_type,
            started_at: OffsetDateTime::now_utc(),
        };
        if let Err(e) = self.store.origin_visit_add(&visit).await {
            warn!(%origin_url, error = %e, "failed to record origin visit, aborting");
            return self.empty_result(visit_id, VisitStatus::Failed);
        }
        state
            .transition(VisitStatus::Ongoing)
            .expect("created -> ongoing is always a legal transition");

        let scratch_dir = self
            .scratch_root
            .join(format!("visit-{visit_id}-{}", self.next_scratch_id.fetch_add(1, Ordering::Relaxed)));
        if let Err(e) = std::fs::create_dir_all(&scratch_dir) {
            warn!(%origin_url, error = %e, "failed to create scratch directory");
            return self.finish(&origin, visit_id, &mut state, VisitStatus::Failed, None, Vec::new(), LoadStats::default(), true).await;
        }
        // spec.md §4.6 step 8: always delete the scratch directory, on
        // every exit path including cancellation or a panic unwind.
        let cleanup_dir = scratch_dir.clone();
        let _cleanup = scopeguard::guard((), move |()| {
            if let Err(e) = std::fs::remove_dir_all(&cleanup_dir) {
                debug!(path = %cleanup_dir.display(), error = %e, "scratch dir cleanup failed (already gone?)");
            }
        });

        let adapter = Adapter::for_visit_type(visit_type, origin_url.clone());
        let mut failures = FailureLedger::new();

        let visit_fut = self.run_visit(&origin, &adapter, &scratch_dir, cancel, &mut failures);
        let outcome = match tokio::time::timeout(self.config.visit_timeout(), visit_fut).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let status = match e {
                    LoaderError::NotFound(_) => VisitStatus::NotFound,
                    _ => VisitStatus::Failed,
                };
                info!(%origin_url, error = %e, "visit-level failure listing or staging this origin");
                return self.finish(&origin, visit_id, &mut state, status, None, failures.into_vec(), LoadStats::default(), true).await;
            }
            Err(_elapsed) => {
                warn!(%origin_url, timeout_secs = self.config.visit_timeout_secs, "visit exceeded its wall-clock budget");
                return self.finish(&origin, visit_id, &mut state, VisitStatus::Failed, None, failures.into_vec(), LoadStats::default(), true).await;
            }
        };

        let mut status = if outcome.cancelled {
            VisitStatus::Failed
        } else if outcome.stats.branches_succeeded == 0 && outcome.stats.branches_reused == 0 {
            if failures.is_empty() {
                VisitStatus::Full
            } else {
                VisitStatus::Failed
            }
        } else if failures.is_empty() {
            VisitStatus::Full
        } else {
            VisitStatus::Partial
        };

        let snapshot_id = hash::snapshot_id(&outcome.snapshot);
        let mut persisted_snapshot_id = Some(snapshot_id).filter(|_| status != VisitStatus::Failed);
        if status != VisitStatus::Failed {
            if let Err(e) = self.flush(&origin, visit_id, snapshot_id, &outcome).await {
                // §4.8: a store-unavailable flush is retried at the
                // orchestrator level up to `flush_retry_attempts` times
                // (see `flush`); once that's exhausted the Snapshot was
                // never made durable, so the visit can't honestly report
                // anything but `failed` with no snapshot id.
                warn!(%origin, error = %e, "flush failed after exhausting retries, marking visit failed");
                status = VisitStatus::Failed;
                persisted_snapshot_id = None;
            }
        }

        let uneventful = !outcome.new_objects_written && !outcome.cancelled;
        self.finish(
            &origin,
            visit_id,
            &mut state,
            status,
            persisted_snapshot_id,
            failures.into_vec(),
            outcome.stats,
            uneventful,
        )
        .await
    }

    /// Lists versions, processes every branch of every version, and
    /// assembles the new Snapshot. Errors returned here are visit-level
    /// fatal (spec.md §4.8: "adapter can't list versions, origin 404").
    async fn run_visit(
        &self,
        origin: &Origin,
        adapter: &Adapter,
        scratch_dir: &Path,
        cancel: &CancelToken,
        failures: &mut FailureLedger,
    ) -> Result<VisitOutcome> {
        let transport = self.fetcher.transport();
        let versions = adapter.get_versions(transport).await?;
        let default_version = adapter.get_default_version(transport).await?;

        // Informational only (spec.md §4.6 step 2): the actual reuse
        // mechanism is the global ExtID lookup in `process_one_artifact`,
        // not a per-branch map built from this snapshot, since an ExtID
        // may have been recorded under a branch name this origin no
        // longer lists (e.g. the dedup case in spec.md §8 scenario 2).
        let previous_branch_count = match self
            .store
            .snapshot_get_latest(origin, &[VisitStatus::Full, VisitStatus::Partial])
            .await
        {
            Ok(Some((_, snap))) => snap.branches.len(),
            Ok(None) => 0,
            Err(e) => {
                debug!(%origin, error = %e, "failed to load previous snapshot, proceeding as a first visit");
                0
            }
        };
        debug!(%origin, previous_branch_count, version_count = versions.len(), "starting visit");

        let mut staging = Staging::new(Arc::clone(&self.store), &self.config);
        let mut snapshot = Snapshot::new();
        let mut stats = LoadStats::default();
        let mut new_objects_written = false;
        let mut default_branch: Option<Vec<u8>> = None;
        let mut cancelled = false;

        for version in &versions {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let branch_infos = match adapter.get_package_info(transport, version).await {
                Ok(v) => v,
                Err(e) => {
                    failures.record(version.clone().into_bytes(), None, &e);
                    continue;
                }
            };

            let outcomes = self
                .process_version_artifacts(adapter, branch_infos, scratch_dir, cancel)
                .await;

            let mut first_branch_this_version: Option<Vec<u8>> = None;
            for outcome in outcomes {
                match outcome {
                    BranchOutcome::Cancelled => {
                        cancelled = true;
                    }
                    BranchOutcome::Declined => {
                        stats.branches_skipped += 1;
                    }
                    BranchOutcome::Failed { branch, url, err } => {
                        failures.record(branch, url, &err);
                        stats.branches_failed += 1;
                    }
                    BranchOutcome::Reused { branch, release_id } => {
                        snapshot.insert(branch.clone(), BranchTarget::Release(release_id))?;
                        stats.branches_reused += 1;
                        first_branch_this_version.get_or_insert(branch);
                    }
                    BranchOutcome::Fresh(artifact) => {
                        new_objects_written = true;
                        staging.stage_tree(artifact.contents, artifact.directories).await?;
                        let (release_id, release) = artifact.release;
                        staging.stage_release(release_id, release).await?;
                        if let Some(extid) = artifact.extid {
                            staging.stage_extid(extid);
                        }
                        snapshot.insert(artifact.branch.clone(), BranchTarget::Release(release_id))?;
                        stats.branches_succeeded += 1;
                        first_branch_this_version.get_or_insert(artifact.branch);
                    }
                }
            }

            if default_branch.is_none() && default_version.as_deref() == Some(version.as_str()) {
                default_branch = first_branch_this_version;
            }

            if cancelled {
                break;
            }
        }

        if adapter.branch_policy().wants_head {
            if let Some(target) = default_branch {
                // A HEAD collision would mean some adapter's own branch is
                // itself literally named "HEAD"; harmless to skip rather
                // than fail the whole visit over an alias.
                let _ = snapshot.insert(b"HEAD".to_vec(), BranchTarget::Alias(target));
            }
        }

        staging.checkpoint().await?;
        let extids = staging.take_extids();

        Ok(VisitOutcome {
            snapshot,
            stats,
            new_objects_written,
            cancelled,
            extids,
        })
    }

    /// Process every artifact of one version with bounded concurrency
    /// (spec.md §5: "adapters may opt into bounded parallel fetching...
    /// across artifacts of the same version only, never across
    /// versions"). Each future is fully self-contained (its own scratch
    /// subdirectory), so no mutable state is shared between them.
    async fn process_version_artifacts(
        &self,
        adapter: &Adapter,
        branch_infos: Vec<(Vec<u8>, PackageInfo)>,
        scratch_dir: &Path,
        cancel: &CancelToken,
    ) -> Vec<BranchOutcome> {
        let limit = self.config.fetch_concurrency.max(1);
        stream::iter(branch_infos.into_iter().map(|(branch, info)| {
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return BranchOutcome::Cancelled;
                }
                self.process_one_artifact(adapter, branch, info, scratch_dir).await
            }
        }))
        .buffer_unordered(limit)
        .collect()
        .await
    }

    /// Steps 4a-4f of spec.md §4.6 for a single `(branch, PackageInfo)`
    /// pair. Never returns an `Err`: every failure mode (structural or
    /// transient-after-retry) becomes `BranchOutcome::Failed` so one bad
    /// artifact never aborts the rest of the visit.
    async fn process_one_artifact(
        &self,
        adapter: &Adapter,
        branch: Vec<u8>,
        info: PackageInfo,
        scratch_dir: &Path,
    ) -> BranchOutcome {
        let url = info.url.to_string();
        let body = async {
            // 4a: short-circuit on a previously staged artifact.
            if let Some(key) = adapter.known_artifact_to_extid(&info) {
                match self.lookup_reused_release(&key).await {
                    Ok(Some(release_id)) => return Ok(BranchOutcome::Reused { branch: branch.clone(), release_id }),
                    Ok(None) => {}
                    Err(e) => return Err(e),
                }
            }

            // 4b: fetch.
            let artifact_path = self.fetcher.fetch(&info.url, &info.checksums, None).await?;

            // 4c: unpack, into a scratch subdirectory exclusive to this branch.
            // The downloaded file itself has no extension (`Fetcher` names
            // it by scratch id, not by origin filename), so the archive
            // kind has to come from what the adapter told us about the
            // artifact rather than from `artifact_path`'s own name.
            let kind = crate::unpack::infer_kind(Path::new(artifact_name(&info)))?;
            let unpack_dir = scratch_dir.join(unique_branch_dir(&branch));
            let unpacked_root = crate::unpack::unpack(&artifact_path, &unpack_dir, Some(kind))?;

            // 4d: content-address.
            let hashed = hash::hash_tree(&unpacked_root)?;

            // 4e: build the release, now that directory_id is known.
            let Some(release) = adapter.build_release(&info, &unpacked_root, hashed.root_id)? else {
                return Ok(BranchOutcome::Declined);
            };
            let release_id = hash::release_id(&release);

            // 4f: stage and record an ExtID keyed on this artifact,
            // targeting the Release so a later visit can reuse it
            // directly without re-reading the unpacked tree.
            let extid = adapter.known_artifact_to_extid(&info).map(|key| ExtID {
                extid_type: key.extid_type,
                extid_version: 0,
                extid: key.extid,
                target_type: crate::store::release_target_type(),
                target_id: release_id,
            });

            Ok(BranchOutcome::Fresh(FreshArtifact {
                branch: branch.clone(),
                contents: hashed.contents,
                directories: hashed.directories,
                release: (release_id, release),
                extid,
            }))
        };

        match tokio::time::timeout(self.config.artifact_timeout(), body).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => BranchOutcome::Failed { branch, url: Some(url), err },
            Err(_elapsed) => BranchOutcome::Failed {
                branch,
                url: Some(url),
                err: LoaderError::Timeout("artifact exceeded its wall-clock budget".into()),
            },
        }
    }

    async fn lookup_reused_release(&self, key: &ExtidKey) -> Result<Option<Sha1Git>> {
        let found = self
            .store
            .extid_get_from_extid(&key.extid_type, std::slice::from_ref(&key.extid))
            .await?;
        Ok(found.into_iter().next().flatten().and_then(|extid| {
            (extid.target_type == ExtidTargetType::Release).then_some(extid.target_id)
        }))
    }

    /// Writes the Snapshot/ExtIDs built up over the visit. Per spec.md
    /// §4.4/§4.8 ("flush failures surface `StoreUnavailable` and are
    /// retried at the orchestrator level up to M times, then the visit is
    /// marked `failed`"): a fresh `Staging` is rebuilt each attempt (since
    /// `finalize` consumes it) and the failure is retried with the same
    /// full-jitter backoff the fetcher uses, up to `flush_retry_attempts`
    /// tries total. `Err` here means every attempt failed; the caller is
    /// responsible for downgrading the visit to `failed` with no snapshot
    /// id, since nothing this call staged was actually made durable.
    async fn flush(&self, origin: &Origin, visit_id: u64, snapshot_id: Sha1Git, outcome: &VisitOutcome) -> Result<()> {
        let visit_status = OriginVisitStatus {
            origin: origin.url.clone(),
            visit_id,
            date: OffsetDateTime::now_utc(),
            status: VisitStatus::Ongoing,
            snapshot_id: Some(snapshot_id),
        };
        let policy = RetryPolicy::new(self.config.flush_retry_attempts.max(1), self.config.backoff_base(), self.config.backoff_cap());

        let mut attempt = 1;
        loop {
            let mut staging = Staging::new(Arc::clone(&self.store), &self.config);
            staging.set_snapshot(snapshot_id, outcome.snapshot.clone());
            for extid in &outcome.extids {
                staging.stage_extid(extid.clone());
            }

            // `finalize` writes the Snapshot/ExtIDs; the real terminal
            // status is written separately by `finish` once the final
            // VisitStatus is known, so this intermediate status value is
            // never observed as the visit's last word.
            match staging.finalize(&visit_status).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= policy.max_attempts => {
                    return Err(LoaderError::StoreUnavailable(format!(
                        "failed to flush staged objects for {origin} after {attempt} attempt(s): {e}"
                    )));
                }
                Err(e) => {
                    debug!(%origin, error = %e, attempt, "flush attempt failed, retrying");
                }
            }

            let delay = policy.backoff_delay(attempt, random_jitter());
            if delay > std::time::Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn finish(
        &self,
        origin: &Origin,
        visit_id: u64,
        state: &mut VisitStateMachine,
        status: VisitStatus,
        snapshot_id: Option<Sha1Git>,
        failures: Vec<crate::failures::FailureRecord>,
        stats: LoadStats,
        uneventful: bool,
    ) -> LoadResult {
        if state.current() == VisitStatus::Created {
            let _ = state.transition(VisitStatus::Ongoing);
        }
        let _ = state.transition(status);

        let visit_status = OriginVisitStatus {
            origin: origin.url.clone(),
            visit_id,
            date: OffsetDateTime::now_utc(),
            status,
            snapshot_id,
        };
        // Best-effort: a store failure while recording the terminal status
        // doesn't change the in-memory result the caller sees.
        if let Err(e) = self.store.origin_visit_status_add(&visit_status).await {
            warn!(%origin, error = %e, "failed to record terminal visit status");
        }

        LoadResult {
            visit_id,
            status,
            uneventful,
            snapshot_id,
            stats,
            failures,
        }
    }

    fn empty_result(&self, visit_id: u64, status: VisitStatus) -> LoadResult {
        LoadResult {
            visit_id,
            status,
            uneventful: false,
            snapshot_id: None,
            stats: LoadStats::default(),
            failures: Vec::new(),
        }
    }
}

fn unique_branch_dir(branch: &[u8]) -> String {
    let digest = hash::content_from_bytes(branch);
    crate::model::hex_digest(&digest.sha1_git)
}

/// The name the unpacker should infer the archive kind from: the adapter's
/// declared filename when it has one, falling back to the artifact URL's
/// own last path segment (both come from the registry, never from local
/// scratch-file naming).
fn artifact_name(info: &PackageInfo) -> &str {
    info.filename
        .as_deref()
        .or_else(|| info.url.path_segments().and_then(|mut s| s.next_back()))
        .unwrap_or("artifact")
}
