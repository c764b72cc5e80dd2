//! In-process collaborators that record how they were used

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::TestCa;
use crate::ca::{
    generate_csr, CaError, CaHandle, CaInfo, CertificateAuthority, Enrollment, EnrollmentRequest,
    EnrollmentSecret, RegistrationRequest, SigningIdentity,
};
use crate::gateway::{
    ConnectOptions, Gateway, GatewayError, GatewaySession, PeerEndpoint,
};

/// CA double backed by a [`TestCa`]
pub struct MockCertificateAuthority {
    ca: TestCa,
    secrets: Mutex<HashMap<String, String>>,
    register_calls: AtomicUsize,
    enroll_calls: AtomicUsize,
    fail_register: AtomicBool,
    fail_enroll: AtomicBool,
    common_name_override: std::sync::Mutex<Option<String>>,
}

impl MockCertificateAuthority {
    pub fn new(ca: TestCa) -> Self {
        Self {
            ca,
            secrets: Mutex::new(HashMap::new()),
            register_calls: AtomicUsize::new(0),
            enroll_calls: AtomicUsize::new(0),
            fail_register: AtomicBool::new(false),
            fail_enroll: AtomicBool::new(false),
            common_name_override: std::sync::Mutex::new(None),
        }
    }

    pub fn test_ca(&self) -> &TestCa {
        &self.ca
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn enroll_calls(&self) -> usize {
        self.enroll_calls.load(Ordering::SeqCst)
    }

    /// Total register + enroll calls
    pub fn calls(&self) -> usize {
        self.register_calls() + self.enroll_calls()
    }

    pub fn fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn fail_enroll(&self, fail: bool) {
        self.fail_enroll.store(fail, Ordering::SeqCst);
    }

    /// Issue enrollment certificates for `name` instead of the enrollment id
    pub fn issue_common_name(&self, name: &str) {
        if let Ok(mut guard) = self.common_name_override.lock() {
            *guard = Some(name.to_string());
        }
    }

    fn common_name_for(&self, enrollment_id: &str) -> String {
        self.common_name_override
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .unwrap_or_else(|| enrollment_id.to_string())
    }
}

#[async_trait]
impl CertificateAuthority for MockCertificateAuthority {
    fn name(&self) -> &str {
        self.ca.name()
    }

    async fn info(&self) -> Result<CaInfo, CaError> {
        Ok(CaInfo {
            ca_name: self.ca.name().to_string(),
            ca_chain: Some(self.ca.certificate_pem()),
            version: None,
        })
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
        _registrar: &SigningIdentity,
    ) -> Result<EnrollmentSecret, CaError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(CaError::Rejected {
                status: 401,
                messages: vec!["[20] Authentication failure".to_string()],
            });
        }

        let mut secrets = self.secrets.lock().await;
        if secrets.contains_key(&request.enrollment_id) {
            return Err(CaError::Rejected {
                status: 400,
                messages: vec![format!(
                    "[74] Identity '{}' is already registered",
                    request.enrollment_id
                )],
            });
        }

        let secret = format!("{}-secret-{}", request.enrollment_id, secrets.len() + 1);
        secrets.insert(request.enrollment_id.clone(), secret.clone());
        Ok(EnrollmentSecret::new(secret))
    }

    async fn enroll(&self, request: EnrollmentRequest) -> Result<Enrollment, CaError> {
        self.enroll_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enroll.load(Ordering::SeqCst) {
            return Err(CaError::Transport("connection reset by peer".to_string()));
        }

        let secrets = self.secrets.lock().await;
        match secrets.get(&request.enrollment_id) {
            Some(secret) if secret == request.secret.expose() => {}
            _ => {
                return Err(CaError::Rejected {
                    status: 401,
                    messages: vec!["[20] Authentication failure".to_string()],
                })
            }
        }

        let csr = generate_csr(&self.common_name_for(&request.enrollment_id))?;
        let certificate = self
            .ca
            .sign_csr(&csr.csr_pem)
            .map_err(|e| CaError::InvalidResponse(e.to_string()))?;

        Ok(Enrollment {
            certificate,
            private_key: csr.private_key.clone(),
            ca_chain: Some(self.ca.certificate_pem()),
        })
    }
}

/// Gateway double handing out sessions around a shared CA
pub struct MockGateway {
    ca: Arc<MockCertificateAuthority>,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail_connect: AtomicBool,
}

impl MockGateway {
    pub fn new(ca: Arc<MockCertificateAuthority>) -> Self {
        Self {
            ca,
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_connect: AtomicBool::new(false),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn connect(
        &self,
        options: ConnectOptions,
    ) -> Result<Box<dyn GatewaySession>, GatewayError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(GatewayError::CaUnavailable(CaError::Transport(
                "connection refused".to_string(),
            )));
        }

        let identity = options
            .wallet
            .get(&options.identity)
            .await?
            .ok_or_else(|| GatewayError::IdentityNotFound(options.identity.clone()))?;

        Ok(Box::new(MockSession {
            identity: SigningIdentity::new(options.identity, identity),
            ca: Arc::clone(&self.ca) as CaHandle,
            closes: Arc::clone(&self.closes),
            closed: false,
        }))
    }
}

pub struct MockSession {
    identity: SigningIdentity,
    ca: CaHandle,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl GatewaySession for MockSession {
    fn certificate_authority(&self) -> Result<CaHandle, GatewayError> {
        if self.closed {
            return Err(GatewayError::SessionClosed);
        }
        Ok(Arc::clone(&self.ca))
    }

    fn current_identity(&self) -> &SigningIdentity {
        &self.identity
    }

    fn endpoints(&self) -> &[PeerEndpoint] {
        &[]
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
