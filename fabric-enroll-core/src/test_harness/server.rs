//! Fake Fabric CA served over HTTP
//!
//! Implements enough of `/api/v1` for end-to-end runs: `cainfo`, `register`
//! (token-authenticated, affiliation-checked, one registration per id) and
//! `enroll` (basic auth, one enrollment per secret).

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use x509_parser::pem::parse_x509_pem;

use super::TestCa;
use crate::ca::verify_auth_token;
use crate::ca::wire::{
    EnrollBody, EnrollResult, Envelope, RegisterBody, RegisterResult, ServerInfo, API_PREFIX,
};

/// CA instance name reported by the fake server
pub const FAKE_CA_NAME: &str = "ca-org2";

struct Registration {
    secret: String,
    affiliation: String,
    enrolled: bool,
}

struct FakeCaState {
    ca: TestCa,
    affiliations: Vec<String>,
    registrations: Mutex<HashMap<String, Registration>>,
    register_calls: AtomicUsize,
    enroll_calls: AtomicUsize,
    reject_enrollments: AtomicBool,
}

/// Running fake CA; the server task stops when this is dropped
pub struct FakeCaServer {
    addr: SocketAddr,
    state: Arc<FakeCaState>,
    handle: JoinHandle<()>,
}

impl FakeCaServer {
    /// Serve on an ephemeral localhost port, accepting affiliation `org2`
    pub async fn start() -> Result<Self> {
        Self::start_with_affiliations(&["org2"]).await
    }

    pub async fn start_with_affiliations(affiliations: &[&str]) -> Result<Self> {
        let state = Arc::new(FakeCaState {
            ca: TestCa::new("ca.org2.example.com")?,
            affiliations: affiliations.iter().map(|a| a.to_string()).collect(),
            registrations: Mutex::new(HashMap::new()),
            register_calls: AtomicUsize::new(0),
            enroll_calls: AtomicUsize::new(0),
            reject_enrollments: AtomicBool::new(false),
        });

        let router = Router::new()
            .route(&format!("{}/cainfo", API_PREFIX), get(cainfo))
            .route(&format!("{}/register", API_PREFIX), post(register))
            .route(&format!("{}/enroll", API_PREFIX), post(enroll))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        info!("Fake CA listening on {}", addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!("Fake CA stopped: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ca(&self) -> &TestCa {
        &self.state.ca
    }

    pub fn register_calls(&self) -> usize {
        self.state.register_calls.load(Ordering::SeqCst)
    }

    pub fn enroll_calls(&self) -> usize {
        self.state.enroll_calls.load(Ordering::SeqCst)
    }

    /// Make every following enroll request fail with HTTP 500
    pub fn reject_enrollments(&self, reject: bool) {
        self.state.reject_enrollments.store(reject, Ordering::SeqCst);
    }

    pub async fn registered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.registrations.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn affiliation_of(&self, id: &str) -> Option<String> {
        self.state
            .registrations
            .lock()
            .await
            .get(id)
            .map(|r| r.affiliation.clone())
    }
}

impl Drop for FakeCaServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn failure(status: StatusCode, code: i64, message: impl Into<String>) -> Response {
    (status, Json(Envelope::<()>::failure(code, message))).into_response()
}

fn server_info(state: &FakeCaState) -> ServerInfo {
    ServerInfo {
        ca_name: FAKE_CA_NAME.to_string(),
        ca_chain: STANDARD.encode(state.ca.certificate_pem()),
        version: Some("1.5.7".to_string()),
    }
}

fn issuer_common_name(pem: &str) -> Option<String> {
    let (_, block) = parse_x509_pem(pem.as_bytes()).ok()?;
    let cert = block.parse_x509().ok()?;
    let cn = cert.issuer().iter_common_name().next()?;
    cn.as_str().ok().map(str::to_string)
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

async fn cainfo(State(state): State<Arc<FakeCaState>>) -> Response {
    Json(Envelope::ok(server_info(&state))).into_response()
}

async fn register(
    State(state): State<Arc<FakeCaState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.register_calls.fetch_add(1, Ordering::SeqCst);

    let Some(token) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return failure(StatusCode::UNAUTHORIZED, 20, "Authorization header missing");
    };
    let uri = format!("{}/register", API_PREFIX);
    let signer = match verify_auth_token(token, "POST", &uri, &body) {
        Ok(cert) => cert,
        Err(e) => return failure(StatusCode::UNAUTHORIZED, 20, e.to_string()),
    };
    if issuer_common_name(&signer).as_deref() != Some(state.ca.name()) {
        return failure(StatusCode::UNAUTHORIZED, 20, "Registrar not issued by this CA");
    }

    let request: RegisterBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return failure(StatusCode::BAD_REQUEST, 0, e.to_string()),
    };

    let known_affiliation = state.affiliations.iter().any(|a| {
        request.affiliation == *a || request.affiliation.starts_with(&format!("{}.", a))
    });
    if !known_affiliation {
        return failure(
            StatusCode::BAD_REQUEST,
            63,
            format!("Failed getting affiliation '{}'", request.affiliation),
        );
    }

    let mut registrations = state.registrations.lock().await;
    if registrations.contains_key(&request.id) {
        return failure(
            StatusCode::BAD_REQUEST,
            74,
            format!("Identity '{}' is already registered", request.id),
        );
    }

    let secret = STANDARD.encode(format!("{}:{}", request.id, registrations.len() + 1));
    registrations.insert(
        request.id.clone(),
        Registration {
            secret: secret.clone(),
            affiliation: request.affiliation,
            enrolled: false,
        },
    );

    Json(Envelope::ok(RegisterResult { secret })).into_response()
}

async fn enroll(
    State(state): State<Arc<FakeCaState>>,
    headers: HeaderMap,
    Json(request): Json<EnrollBody>,
) -> Response {
    state.enroll_calls.fetch_add(1, Ordering::SeqCst);

    if state.reject_enrollments.load(Ordering::SeqCst) {
        return failure(StatusCode::INTERNAL_SERVER_ERROR, 0, "Enrollment disabled");
    }

    let Some((id, secret)) = basic_credentials(&headers) else {
        return failure(StatusCode::UNAUTHORIZED, 20, "Basic authorization required");
    };

    let mut registrations = state.registrations.lock().await;
    let registration = match registrations.get_mut(&id) {
        Some(r) if r.secret == secret && !r.enrolled => r,
        _ => return failure(StatusCode::UNAUTHORIZED, 20, "Authentication failure"),
    };

    match certificate_request_common_name(&request.certificate_request) {
        Some(cn) if cn == id => {}
        _ => {
            return failure(
                StatusCode::BAD_REQUEST,
                0,
                "CSR common name does not match enrollment id",
            )
        }
    }

    let certificate = match state.ca.sign_csr(&request.certificate_request) {
        Ok(certificate) => certificate,
        Err(e) => return failure(StatusCode::BAD_REQUEST, 0, e.to_string()),
    };
    registration.enrolled = true;

    Json(Envelope::ok(EnrollResult {
        cert: STANDARD.encode(certificate),
        server_info: Some(server_info(&state)),
    }))
    .into_response()
}

fn certificate_request_common_name(csr_pem: &str) -> Option<String> {
    let csr = rcgen::CertificateSigningRequestParams::from_pem(csr_pem).ok()?;
    match csr.params.distinguished_name.get(&rcgen::DnType::CommonName)? {
        rcgen::DnValue::Utf8String(cn) => Some(cn.clone()),
        _ => None,
    }
}
