use axum::{response::IntoResponse, routing::get, Json, Router};
use shared::{
    domain::TransactionSignature,
    error::{ApiError, ErrorCode},
};
use tokio::net::TcpListener;

use super::*;

struct ScriptedSigner {
    failure: Option<String>,
    descriptors: tokio::sync::Mutex<Vec<TransactionDescriptor>>,
}

impl ScriptedSigner {
    fn ok() -> Self {
        Self {
            failure: None,
            descriptors: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    fn failing_transaction(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            descriptors: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SignerExtension for ScriptedSigner {
    fn is_present(&self) -> bool {
        true
    }

    fn is_expected_kind(&self) -> bool {
        true
    }

    async fn authenticate_silently(&self) -> Result<WalletAddress, SignerError> {
        Ok(WalletAddress::new("scripted-wallet"))
    }

    async fn authenticate_interactive(&self) -> Result<WalletAddress, SignerError> {
        Ok(WalletAddress::new("scripted-wallet"))
    }

    async fn sign_and_send(
        &self,
        descriptor: TransactionDescriptor,
    ) -> Result<TransactionSignature, SignerError> {
        self.descriptors.lock().await.push(descriptor);
        match &self.failure {
            Some(message) => Err(SignerError::Transaction(message.clone())),
            None => Ok(TransactionSignature::new("sig-1")),
        }
    }
}

#[derive(Clone)]
enum RecordServerMode {
    Entries(Vec<Entry>),
    Missing,
    Failing,
}

async fn spawn_record_server(mode: RecordServerMode) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = Router::new().route(
        "/programs/:program_id/record",
        get(move || {
            let mode = mode.clone();
            async move {
                match mode {
                    RecordServerMode::Entries(entries) => Json(RecordResponse {
                        program_id: ProgramId::new("prog-1"),
                        entries,
                    })
                    .into_response(),
                    RecordServerMode::Missing => (
                        StatusCode::NOT_FOUND,
                        Json(ApiError::new(
                            ErrorCode::NotFound,
                            "record account does not exist",
                        )),
                    )
                        .into_response(),
                    RecordServerMode::Failing => {
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    }
                }
            }
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/")
}

fn http_client(endpoint: &str, signer: Arc<dyn SignerExtension>) -> HttpLedgerClient {
    HttpLedgerClient::new(
        Url::parse(endpoint).expect("endpoint url"),
        ProgramId::new("prog-1"),
        signer,
    )
}

fn entry(link: &str, submitter: &str) -> Entry {
    Entry {
        link: link.to_string(),
        submitter: WalletAddress::new(submitter),
    }
}

#[test]
fn classifies_already_initialized_error_text() {
    assert!(is_already_initialized_error("record account already in use"));
    assert!(is_already_initialized_error("Record already initialized"));
    assert!(is_already_initialized_error("account already exists"));
    assert!(!is_already_initialized_error("connection reset by peer"));
}

#[test]
fn classifies_uninitialized_record_error_text() {
    assert!(is_record_uninitialized_error("record account does not exist"));
    assert!(is_record_uninitialized_error("account is uninitialized"));
    assert!(is_record_uninitialized_error("record not found"));
    assert!(!is_record_uninitialized_error("user rejected the request"));
}

#[tokio::test]
async fn fetch_returns_entries_in_remote_order() {
    let entries = vec![entry("http://x/a.gif", "w1"), entry("http://x/b.gif", "w2")];
    let endpoint = spawn_record_server(RecordServerMode::Entries(entries.clone())).await;
    let client = http_client(&endpoint, Arc::new(ScriptedSigner::ok()));

    let outcome = client.fetch_record().await.expect("fetch");
    assert_eq!(outcome, FetchOutcome::Record(entries));
}

#[tokio::test]
async fn fetch_maps_missing_record_to_not_found() {
    let endpoint = spawn_record_server(RecordServerMode::Missing).await;
    let client = http_client(&endpoint, Arc::new(ScriptedSigner::ok()));

    let outcome = client.fetch_record().await.expect("fetch");
    assert_eq!(outcome, FetchOutcome::NotFound);
}

#[tokio::test]
async fn fetch_server_error_is_an_rpc_failure() {
    let endpoint = spawn_record_server(RecordServerMode::Failing).await;
    let client = http_client(&endpoint, Arc::new(ScriptedSigner::ok()));

    let err = client.fetch_record().await.expect_err("must fail");
    assert!(matches!(err, LedgerError::Rpc(_)));
}

#[tokio::test]
async fn append_signs_the_expected_descriptor() {
    let signer = Arc::new(ScriptedSigner::ok());
    let client = http_client(
        "http://127.0.0.1:9/",
        Arc::clone(&signer) as Arc<dyn SignerExtension>,
    );

    let outcome = client
        .append_entry("http://x/a.gif", &WalletAddress::new("w1"))
        .await
        .expect("append");
    assert_eq!(outcome, AppendOutcome::Appended);

    let descriptors = signer.descriptors.lock().await;
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].program_id.as_str(), "prog-1");
    assert_eq!(descriptors[0].signer.as_str(), "w1");
    assert_eq!(
        descriptors[0].instruction,
        LedgerInstruction::AppendEntry {
            link: "http://x/a.gif".to_string()
        }
    );
}

#[tokio::test]
async fn initialize_classifies_existing_record_as_already_initialized() {
    let client = http_client(
        "http://127.0.0.1:9/",
        Arc::new(ScriptedSigner::failing_transaction(
            "record account already in use",
        )),
    );

    let outcome = client
        .initialize_record(&WalletAddress::new("w1"))
        .await
        .expect("outcome");
    assert_eq!(outcome, InitializeOutcome::AlreadyInitialized);
}

#[tokio::test]
async fn append_classifies_missing_record_as_uninitialized() {
    let client = http_client(
        "http://127.0.0.1:9/",
        Arc::new(ScriptedSigner::failing_transaction(
            "record account does not exist",
        )),
    );

    let outcome = client
        .append_entry("http://x/a.gif", &WalletAddress::new("w1"))
        .await
        .expect("outcome");
    assert_eq!(outcome, AppendOutcome::RecordUninitialized);
}

#[tokio::test]
async fn unclassified_transaction_failure_is_an_rpc_failure() {
    let client = http_client(
        "http://127.0.0.1:9/",
        Arc::new(ScriptedSigner::failing_transaction("compute budget exceeded")),
    );

    let err = client
        .initialize_record(&WalletAddress::new("w1"))
        .await
        .expect_err("must fail");
    assert!(matches!(err, LedgerError::Rpc(_)));
}
