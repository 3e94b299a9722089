use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use shared::{
    domain::{Entry, TransactionSignature, WalletAddress},
    protocol::TransactionDescriptor,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod ledger;

pub use ledger::{
    AppendOutcome, FetchOutcome, HttpLedgerClient, InitializeOutcome, LedgerClient, LedgerError,
    MissingLedgerClient,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("no signer extension present in the host environment")]
    ExtensionMissing,
    #[error("installed signer extension is not the expected kind")]
    UnexpectedKind,
    #[error("silent authentication has not been granted for this origin")]
    SilentAuthUnavailable,
    #[error("user rejected the authentication request")]
    UserRejected,
    #[error("transaction failed: {0}")]
    Transaction(String),
    #[error("signer transport failed: {0}")]
    Transport(String),
}

/// The browser-resident signer the portal authenticates against. Private key
/// material never crosses this boundary; the extension only hands back the
/// public wallet address and signed transactions.
#[async_trait]
pub trait SignerExtension: Send + Sync {
    fn is_present(&self) -> bool;
    fn is_expected_kind(&self) -> bool;
    /// Authenticate without prompting. Fails whenever the user has not
    /// previously granted this origin; callers treat that as routine.
    async fn authenticate_silently(&self) -> Result<WalletAddress, SignerError>;
    /// Authenticate through the extension's consent UI.
    async fn authenticate_interactive(&self) -> Result<WalletAddress, SignerError>;
    /// Sign the descriptor and submit it to the ledger network.
    async fn sign_and_send(
        &self,
        descriptor: TransactionDescriptor,
    ) -> Result<TransactionSignature, SignerError>;
}

pub struct MissingSignerExtension;

#[async_trait]
impl SignerExtension for MissingSignerExtension {
    fn is_present(&self) -> bool {
        false
    }

    fn is_expected_kind(&self) -> bool {
        false
    }

    async fn authenticate_silently(&self) -> Result<WalletAddress, SignerError> {
        Err(SignerError::ExtensionMissing)
    }

    async fn authenticate_interactive(&self) -> Result<WalletAddress, SignerError> {
        Err(SignerError::ExtensionMissing)
    }

    async fn sign_and_send(
        &self,
        _descriptor: TransactionDescriptor,
    ) -> Result<TransactionSignature, SignerError> {
        Err(SignerError::ExtensionMissing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    Disconnected,
    Connecting,
    Connected,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSession {
    pub status: WalletStatus,
    pub address: Option<WalletAddress>,
}

impl WalletSession {
    fn disconnected() -> Self {
        Self {
            status: WalletStatus::Disconnected,
            address: None,
        }
    }

    /// Address of the signer, present only while Connected.
    pub fn connected_address(&self) -> Option<&WalletAddress> {
        match self.status {
            WalletStatus::Connected => self.address.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryStatus {
    Unknown,
    Uninitialized,
    Ready,
    RefreshFailed,
}

/// Locally-known view of the remote record. `entries` is meaningful only
/// while status is Ready; refresh replaces it wholesale, never patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryState {
    pub status: GalleryStatus,
    pub entries: Vec<Entry>,
}

impl GalleryState {
    fn unknown() -> Self {
        Self {
            status: GalleryStatus::Unknown,
            entries: Vec::new(),
        }
    }

    fn uninitialized() -> Self {
        Self {
            status: GalleryStatus::Uninitialized,
            entries: Vec::new(),
        }
    }
}

/// At most one of these is alive per client; `submit` refuses to start a
/// second while one is outstanding.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub link: String,
    pub started_at: Instant,
}

#[derive(Debug, Clone)]
pub enum PortalEvent {
    WalletChanged(WalletSession),
    GalleryChanged(GalleryState),
    Error(String),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no signer extension present in the host environment")]
    ExtensionMissing,
    #[error("installed signer extension is not the expected kind")]
    UnexpectedKind,
    #[error("wallet authentication was rejected: {0}")]
    Rejected(String),
}

/// Why `initialize` finished without an RPC error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeAction {
    Initialized,
    AlreadyInitialized,
    /// Precondition not met (record not awaiting initialization, or wallet
    /// not connected); nothing was sent.
    NotRequired,
}

/// How `submit` disposed of the request without an RPC error. Every variant
/// other than Submitted and RecordUninitialized is a defensive no-op that
/// produced no remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted,
    RecordUninitialized,
    EmptyLink,
    SubmissionInFlight,
    WalletNotConnected,
    GalleryNotReady,
}

#[derive(Debug, Error)]
#[error("failed to append entry {link:?}: {source}")]
pub struct SubmitError {
    /// The optimistically-cleared input is not restored; the link rides
    /// along here so callers can re-offer it.
    pub link: String,
    #[source]
    pub source: LedgerError,
}

struct PortalState {
    wallet: WalletSession,
    gallery: GalleryState,
    pending_submission: Option<PendingSubmission>,
    input: String,
    // Monotonic refresh sequencing; a completed fetch is applied only while
    // its number is still the latest issued.
    refresh_seq: u64,
}

/// Owns the whole session/synchronization state machine for one portal tab:
/// wallet authentication lifecycle, the gallery view of the remote record,
/// and serialized entry submission.
pub struct PortalClient {
    signer: Arc<dyn SignerExtension>,
    ledger: Arc<dyn LedgerClient>,
    inner: Mutex<PortalState>,
    events: broadcast::Sender<PortalEvent>,
}

impl PortalClient {
    pub fn new() -> Arc<Self> {
        Self::new_with_dependencies(
            Arc::new(MissingSignerExtension),
            Arc::new(MissingLedgerClient),
        )
    }

    pub fn new_with_dependencies(
        signer: Arc<dyn SignerExtension>,
        ledger: Arc<dyn LedgerClient>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            signer,
            ledger,
            inner: Mutex::new(PortalState {
                wallet: WalletSession::disconnected(),
                gallery: GalleryState::unknown(),
                pending_submission: None,
                input: String::new(),
                refresh_seq: 0,
            }),
            events,
        })
    }

    pub async fn wallet_session(&self) -> WalletSession {
        self.inner.lock().await.wallet.clone()
    }

    pub async fn gallery_state(&self) -> GalleryState {
        self.inner.lock().await.gallery.clone()
    }

    pub async fn pending_submission(&self) -> Option<PendingSubmission> {
        self.inner.lock().await.pending_submission.clone()
    }

    pub async fn set_input(&self, value: &str) {
        let mut guard = self.inner.lock().await;
        guard.input = value.to_string();
    }

    pub async fn input(&self) -> String {
        self.inner.lock().await.input.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PortalEvent> {
        self.events.subscribe()
    }

    async fn transition_wallet(
        &self,
        status: WalletStatus,
        address: Option<WalletAddress>,
    ) -> WalletSession {
        let session = {
            let mut guard = self.inner.lock().await;
            guard.wallet = WalletSession { status, address };
            guard.wallet.clone()
        };
        let _ = self
            .events
            .send(PortalEvent::WalletChanged(session.clone()));
        session
    }

    /// Silent authentication against the installed extension. Absent
    /// extensions, wrong extension kinds, and ungranted origins are the
    /// expected first-visit outcomes, so they are observed and swallowed
    /// rather than surfaced. A successful connect runs a refresh before
    /// returning, so callers see the record without wiring any event glue.
    pub async fn try_auto_connect(&self) -> Option<WalletAddress> {
        {
            let guard = self.inner.lock().await;
            if let Some(address) = guard.wallet.connected_address() {
                return Some(address.clone());
            }
            if guard.wallet.status == WalletStatus::Connecting {
                info!("wallet: auto-connect skipped; an attempt is already underway");
                return None;
            }
        }

        if !self.signer.is_present() {
            info!("wallet: no signer extension present; staying disconnected");
            return None;
        }
        if !self.signer.is_expected_kind() {
            warn!("wallet: installed signer extension is not the expected kind");
            return None;
        }

        self.transition_wallet(WalletStatus::Connecting, None).await;

        match self.signer.authenticate_silently().await {
            Ok(address) => {
                info!(%address, "wallet: silent authentication succeeded");
                self.transition_wallet(WalletStatus::Connected, Some(address.clone()))
                    .await;
                self.refresh().await;
                Some(address)
            }
            Err(err) => {
                info!("wallet: silent authentication unavailable: {err}");
                self.transition_wallet(WalletStatus::Disconnected, None)
                    .await;
                None
            }
        }
    }

    /// Prompt the extension's consent UI. Unlike auto-connect this path was
    /// user-initiated, so denial and missing extensions are surfaced.
    pub async fn connect_interactive(&self) -> Result<WalletAddress, ConnectError> {
        {
            let guard = self.inner.lock().await;
            if let Some(address) = guard.wallet.connected_address() {
                return Ok(address.clone());
            }
        }

        if !self.signer.is_present() {
            return Err(self.fail_connect(ConnectError::ExtensionMissing).await);
        }
        if !self.signer.is_expected_kind() {
            return Err(self.fail_connect(ConnectError::UnexpectedKind).await);
        }

        self.transition_wallet(WalletStatus::Connecting, None).await;

        match self.signer.authenticate_interactive().await {
            Ok(address) => {
                info!(%address, "wallet: interactive authentication succeeded");
                self.transition_wallet(WalletStatus::Connected, Some(address.clone()))
                    .await;
                self.refresh().await;
                Ok(address)
            }
            Err(err) => Err(self
                .fail_connect(ConnectError::Rejected(err.to_string()))
                .await),
        }
    }

    async fn fail_connect(&self, err: ConnectError) -> ConnectError {
        warn!("wallet: interactive connect failed: {err}");
        self.transition_wallet(WalletStatus::Rejected, None).await;
        let _ = self.events.send(PortalEvent::Error(err.to_string()));
        err
    }

    /// Re-fetch the remote record and replace the local view wholesale.
    /// Outcome mapping: NotFound means the record awaits its one-time
    /// initialization; an RPC failure keeps the previous entries because
    /// stale-but-present beats discarding known-good data on a blip.
    pub async fn refresh(&self) -> GalleryState {
        let seq = {
            let mut guard = self.inner.lock().await;
            guard.refresh_seq += 1;
            guard.refresh_seq
        };

        let fetched = self.ledger.fetch_record().await;

        let snapshot = {
            let mut guard = self.inner.lock().await;
            if seq != guard.refresh_seq {
                info!(
                    seq,
                    latest = guard.refresh_seq,
                    "gallery: discarding stale refresh response"
                );
                return guard.gallery.clone();
            }

            match fetched {
                Ok(FetchOutcome::Record(entries)) => {
                    guard.gallery = GalleryState {
                        status: GalleryStatus::Ready,
                        entries,
                    };
                }
                Ok(FetchOutcome::NotFound) => {
                    guard.gallery = GalleryState::uninitialized();
                }
                Err(err) => {
                    warn!("gallery: refresh failed, keeping last known entries: {err}");
                    guard.gallery.status = GalleryStatus::RefreshFailed;
                }
            }
            guard.gallery.clone()
        };

        let _ = self
            .events
            .send(PortalEvent::GalleryChanged(snapshot.clone()));
        snapshot
    }

    /// One-time record initialization. Only meaningful while the gallery is
    /// Uninitialized and the wallet is Connected; anything else is a no-op.
    /// AlreadyInitialized from the ledger means somebody else won the race
    /// and the record is usable, which is as good as success here.
    pub async fn initialize(&self) -> Result<InitializeAction, LedgerError> {
        let signer_address = {
            let guard = self.inner.lock().await;
            if guard.gallery.status != GalleryStatus::Uninitialized {
                info!(
                    status = ?guard.gallery.status,
                    "gallery: initialize skipped; record is not awaiting initialization"
                );
                return Ok(InitializeAction::NotRequired);
            }
            match guard.wallet.connected_address() {
                Some(address) => address.clone(),
                None => {
                    info!("gallery: initialize skipped; wallet is not connected");
                    return Ok(InitializeAction::NotRequired);
                }
            }
        };

        match self.ledger.initialize_record(&signer_address).await {
            Ok(InitializeOutcome::Initialized) => {
                info!("ledger: record initialized");
                self.refresh().await;
                Ok(InitializeAction::Initialized)
            }
            Ok(InitializeOutcome::AlreadyInitialized) => {
                info!("ledger: record was already initialized; treating as success");
                self.refresh().await;
                Ok(InitializeAction::AlreadyInitialized)
            }
            Err(err) => {
                let _ = self.events.send(PortalEvent::Error(format!(
                    "record initialization failed: {err}"
                )));
                Err(err)
            }
        }
    }

    /// Append one link to the shared record. Preconditions are checked and
    /// the PendingSubmission recorded under a single lock acquisition, which
    /// is what enforces at-most-one-in-flight. The input buffer is cleared
    /// optimistically in that same critical section, before the remote call,
    /// and is not restored on failure.
    pub async fn submit(&self, link: &str) -> Result<SubmitOutcome, SubmitError> {
        let link = link.trim();
        let signer_address = {
            let mut guard = self.inner.lock().await;
            if link.is_empty() {
                info!("submit: ignoring empty link");
                return Ok(SubmitOutcome::EmptyLink);
            }
            if guard.pending_submission.is_some() {
                info!("submit: suppressed; a submission is already in flight");
                return Ok(SubmitOutcome::SubmissionInFlight);
            }
            let address = match guard.wallet.connected_address() {
                Some(address) => address.clone(),
                None => {
                    info!("submit: suppressed; wallet is not connected");
                    return Ok(SubmitOutcome::WalletNotConnected);
                }
            };
            if guard.gallery.status != GalleryStatus::Ready {
                info!(
                    status = ?guard.gallery.status,
                    "submit: suppressed; gallery is not ready"
                );
                return Ok(SubmitOutcome::GalleryNotReady);
            }

            guard.input.clear();
            guard.pending_submission = Some(PendingSubmission {
                link: link.to_string(),
                started_at: Instant::now(),
            });
            address
        };

        let appended = self.ledger.append_entry(link, &signer_address).await;

        {
            let mut guard = self.inner.lock().await;
            guard.pending_submission = None;
        }

        match appended {
            Ok(AppendOutcome::Appended) => {
                info!(link, "submit: entry appended");
                self.refresh().await;
                Ok(SubmitOutcome::Submitted)
            }
            Ok(AppendOutcome::RecordUninitialized) => {
                // Initialization happened out-of-band or was never observed;
                // self-heal the local view instead of erroring.
                warn!(link, "submit: record uninitialized; resetting gallery state");
                let snapshot = {
                    let mut guard = self.inner.lock().await;
                    guard.gallery = GalleryState::uninitialized();
                    guard.gallery.clone()
                };
                let _ = self.events.send(PortalEvent::GalleryChanged(snapshot));
                Ok(SubmitOutcome::RecordUninitialized)
            }
            Err(source) => {
                let err = SubmitError {
                    link: link.to_string(),
                    source,
                };
                let _ = self.events.send(PortalEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }
}

/// Seam consumed by the presentation layer: status snapshots to render,
/// operations to invoke on startup and on user action.
#[async_trait]
pub trait PortalHandle: Send + Sync {
    async fn try_auto_connect(&self) -> Option<WalletAddress>;
    async fn connect_interactive(&self) -> Result<WalletAddress, ConnectError>;
    async fn refresh(&self) -> GalleryState;
    async fn initialize(&self) -> Result<InitializeAction, LedgerError>;
    async fn submit(&self, link: &str) -> Result<SubmitOutcome, SubmitError>;
    async fn set_input(&self, value: &str);
    async fn input(&self) -> String;
    async fn wallet_session(&self) -> WalletSession;
    async fn gallery_state(&self) -> GalleryState;
    fn subscribe_events(&self) -> broadcast::Receiver<PortalEvent>;
}

#[async_trait]
impl PortalHandle for Arc<PortalClient> {
    async fn try_auto_connect(&self) -> Option<WalletAddress> {
        PortalClient::try_auto_connect(self).await
    }

    async fn connect_interactive(&self) -> Result<WalletAddress, ConnectError> {
        PortalClient::connect_interactive(self).await
    }

    async fn refresh(&self) -> GalleryState {
        PortalClient::refresh(self).await
    }

    async fn initialize(&self) -> Result<InitializeAction, LedgerError> {
        PortalClient::initialize(self).await
    }

    async fn submit(&self, link: &str) -> Result<SubmitOutcome, SubmitError> {
        PortalClient::submit(self, link).await
    }

    async fn set_input(&self, value: &str) {
        PortalClient::set_input(self, value).await
    }

    async fn input(&self) -> String {
        PortalClient::input(self).await
    }

    async fn wallet_session(&self) -> WalletSession {
        PortalClient::wallet_session(self).await
    }

    async fn gallery_state(&self) -> GalleryState {
        PortalClient::gallery_state(self).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<PortalEvent> {
        PortalClient::subscribe_events(self)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
