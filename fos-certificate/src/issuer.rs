//! Issuing certificates for licensed processing runs.

use crate::certificate::{CertificateDraft, ProcessingCertificate};
use crate::error::CertificateResult;
use crate::sequence::SequenceAllocator;
use crate::signer::CertificateSigner;
use chrono::{DateTime, Utc};
use fos_audit::{events, AuditEvent, AuditSink};
use fos_license::{LicenseGate, LicenseHolder};
use fos_types::{ErrorKind, TrustFailure, TrustResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// What a module reports about a finished processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub license_id: String,
    pub licensee_code: String,
    pub module_id: String,
    pub module_version: String,
    pub project_metadata: BTreeMap<String, String>,
    pub processing_data: BTreeMap<String, String>,
    pub input_files: Vec<String>,
    pub output_files: Vec<String>,
    pub signatory_name: String,
    pub company_name: String,
}

/// Gate check, id allocation and signing in one step.
pub struct CertificateIssuer {
    gate: Arc<LicenseGate>,
    allocator: SequenceAllocator,
    signer: CertificateSigner,
    audit: Arc<dyn AuditSink>,
}

impl CertificateIssuer {
    pub fn new(
        gate: Arc<LicenseGate>,
        allocator: SequenceAllocator,
        signer: CertificateSigner,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            gate,
            allocator,
            signer,
            audit,
        }
    }

    /// Issues a signed certificate for `request` at `now`.
    ///
    /// # Errors
    ///
    /// `ModuleNotLicensed` if the gate denies the module; `LicenseMismatch`
    /// if the request names another license or licensee; allocation errors
    /// (`SequenceOutOfRange`, `FormatMismatch`, storage) otherwise. Failures
    /// are audited; no sequence number is consumed when the gate denies.
    pub fn issue(&self, request: IssueRequest, now: DateTime<Utc>) -> CertificateResult<ProcessingCertificate> {
        let module_id = request.module_id.clone();
        match self.try_issue(request, now) {
            Ok(certificate) => {
                self.audit.record(
                    AuditEvent::new(events::CERTIFICATE_ISSUE, "certificate issued", true)
                        .with_detail("certificateId", certificate.certificate_id.to_string())
                        .with_detail("moduleId", module_id.as_str()),
                );
                info!(certificate_id = %certificate.certificate_id, module_id = %module_id, "Issued certificate");
                Ok(certificate)
            }
            Err(e) => {
                self.audit.record(
                    AuditEvent::new(events::CERTIFICATE_ISSUE, "certificate not issued", false)
                        .with_detail("moduleId", module_id.as_str())
                        .with_detail("error", e.to_string()),
                );
                warn!(module_id = %module_id, error = %e, "Certificate issuance refused");
                Err(e)
            }
        }
    }

    fn try_issue(&self, request: IssueRequest, now: DateTime<Utc>) -> CertificateResult<ProcessingCertificate> {
        self.gate.authorize_module(&request.module_id)?;
        let holder = self.gate.holder().ok_or_else(|| {
            TrustFailure::new(ErrorKind::ModuleNotLicensed, "no license in force")
                .with_detail("moduleId", request.module_id.as_str())
        })?;
        check_holder(&holder, &request)?;
        let certificate_id = self.allocator.allocate(&request.licensee_code, now)?;

        let draft = CertificateDraft {
            certificate_id,
            license_id: request.license_id,
            module_id: request.module_id,
            module_version: request.module_version,
            issued_at: now,
            project_metadata: request.project_metadata,
            processing_data: request.processing_data,
            input_files: request.input_files,
            output_files: request.output_files,
            signatory_name: request.signatory_name,
            company_name: request.company_name,
        };
        Ok(self.signer.sign(draft))
    }

    #[must_use]
    pub fn allocator(&self) -> &SequenceAllocator {
        &self.allocator
    }
}

fn check_holder(holder: &LicenseHolder, request: &IssueRequest) -> TrustResult<()> {
    if request.license_id.trim() != holder.license_id {
        return Err(TrustFailure::new(
            ErrorKind::LicenseMismatch,
            "request names a license other than the one in force",
        ));
    }
    if !request
        .licensee_code
        .trim()
        .eq_ignore_ascii_case(&holder.client_code)
    {
        return Err(TrustFailure::new(
            ErrorKind::LicenseMismatch,
            "request names a licensee other than the license holder",
        )
        .with_detail("licenseeCode", request.licensee_code.as_str())
        .with_detail("clientCode", holder.client_code.as_str()));
    }
    Ok(())
}
