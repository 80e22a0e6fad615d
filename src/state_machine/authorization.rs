use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// The four stages of the credential-escrow handshake.
///
/// Stages are ordered: INITIAL → CREDS_AVAILABLE → CREDS_ENCRYPTION_KEY_GENERATED
/// → CREDS_ENCRYPTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Initial,
    CredsAvailable,
    CredsEncryptionKeyGenerated,
    CredsEncrypted,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Initial,
        Stage::CredsAvailable,
        Stage::CredsEncryptionKeyGenerated,
        Stage::CredsEncrypted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initial => "INITIAL",
            Stage::CredsAvailable => "CREDS_AVAILABLE",
            Stage::CredsEncryptionKeyGenerated => "CREDS_ENCRYPTION_KEY_GENERATED",
            Stage::CredsEncrypted => "CREDS_ENCRYPTED",
        }
    }

    /// Whether `field` must be populated or must be empty at this stage.
    pub fn presence(self, field: AuthField) -> Presence {
        use AuthField::{PrivateKey, PublicKey, SessionKey};

        match (self, field) {
            (_, SessionKey) => Presence::Required,
            (Stage::Initial | Stage::CredsAvailable, _) => Presence::Forbidden,
            (Stage::CredsEncryptionKeyGenerated, PublicKey | PrivateKey) => Presence::Required,
            (Stage::CredsEncryptionKeyGenerated, _) => Presence::Forbidden,
            (Stage::CredsEncrypted, _) => Presence::Required,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| JobError::UnknownStage(s.to_string()))
    }
}

/// The encrypted artifacts an authorization can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthField {
    SessionKey,
    ExportAuthData,
    ImportAuthData,
    PublicKey,
    PrivateKey,
}

impl AuthField {
    pub const ALL: [AuthField; 5] = [
        AuthField::SessionKey,
        AuthField::ExportAuthData,
        AuthField::ImportAuthData,
        AuthField::PublicKey,
        AuthField::PrivateKey,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AuthField::SessionKey => "encryptedSessionKey",
            AuthField::ExportAuthData => "encryptedExportAuthData",
            AuthField::ImportAuthData => "encryptedImportAuthData",
            AuthField::PublicKey => "encryptedPublicKey",
            AuthField::PrivateKey => "encryptedPrivateKey",
        }
    }
}

impl fmt::Display for AuthField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Presence rule for one field at one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Forbidden,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Required => write!(f, "requires"),
            Presence::Forbidden => write!(f, "forbids"),
        }
    }
}

/// An encrypted artifact. Never blank.
///
/// `Debug` prints only the length so records can be logged safely.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Sealed(String);

impl Sealed {
    /// Returns `None` for empty or whitespace-only input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Sealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sealed({} bytes)", self.0.len())
    }
}

impl AsRef<str> for Sealed {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key pair generated for the worker instance assigned to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerKeys {
    pub public_key: Sealed,
    pub private_key: Sealed,
}

/// Service credentials, encrypted for the assigned worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCredentials {
    pub export_auth_data: Sealed,
    pub import_auth_data: Sealed,
}

/// Authorization sub-record of a job: one variant per stage, each holding
/// exactly the artifacts valid for it.
///
/// `Initial { session_key: None }` is the unkeyed default a new job starts
/// with. It cannot be submitted through [`JobBuilder::set_authorization`](super::JobBuilder::set_authorization).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AuthorizationFields", into = "AuthorizationFields")]
pub enum Authorization {
    Initial {
        session_key: Option<Sealed>,
    },
    CredsAvailable {
        session_key: Sealed,
    },
    CredsEncryptionKeyGenerated {
        session_key: Sealed,
        worker_keys: WorkerKeys,
    },
    CredsEncrypted {
        session_key: Sealed,
        worker_keys: WorkerKeys,
        credentials: EncryptedCredentials,
    },
}

impl Default for Authorization {
    fn default() -> Self {
        Authorization::Initial { session_key: None }
    }
}

impl Authorization {
    pub fn stage(&self) -> Stage {
        match self {
            Authorization::Initial { .. } => Stage::Initial,
            Authorization::CredsAvailable { .. } => Stage::CredsAvailable,
            Authorization::CredsEncryptionKeyGenerated { .. } => Stage::CredsEncryptionKeyGenerated,
            Authorization::CredsEncrypted { .. } => Stage::CredsEncrypted,
        }
    }

    pub fn session_key(&self) -> Option<&Sealed> {
        match self {
            Authorization::Initial { session_key } => session_key.as_ref(),
            Authorization::CredsAvailable { session_key }
            | Authorization::CredsEncryptionKeyGenerated { session_key, .. }
            | Authorization::CredsEncrypted { session_key, .. } => Some(session_key),
        }
    }

    pub fn worker_keys(&self) -> Option<&WorkerKeys> {
        match self {
            Authorization::CredsEncryptionKeyGenerated { worker_keys, .. }
            | Authorization::CredsEncrypted { worker_keys, .. } => Some(worker_keys),
            _ => None,
        }
    }

    pub fn credentials(&self) -> Option<&EncryptedCredentials> {
        match self {
            Authorization::CredsEncrypted { credentials, .. } => Some(credentials),
            _ => None,
        }
    }

    /// Looks up a single artifact by field.
    pub fn field(&self, field: AuthField) -> Option<&Sealed> {
        match field {
            AuthField::SessionKey => self.session_key(),
            AuthField::PublicKey => self.worker_keys().map(|k| &k.public_key),
            AuthField::PrivateKey => self.worker_keys().map(|k| &k.private_key),
            AuthField::ExportAuthData => self.credentials().map(|c| &c.export_auth_data),
            AuthField::ImportAuthData => self.credentials().map(|c| &c.import_auth_data),
        }
    }

    /// True for the default INITIAL value that has no session key yet.
    pub fn is_unkeyed(&self) -> bool {
        matches!(self, Authorization::Initial { session_key: None })
    }
}

/// Flat, unvalidated form of an [`Authorization`].
///
/// This is what external collaborators, the JSON transport and the map codec
/// produce. Converting it into an `Authorization` applies the stage table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationFields {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_export_auth_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_import_auth_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key: Option<String>,
}

impl AuthorizationFields {
    /// All fields empty.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            encrypted_session_key: None,
            encrypted_export_auth_data: None,
            encrypted_import_auth_data: None,
            encrypted_public_key: None,
            encrypted_private_key: None,
        }
    }

    /// Sets one field, returning `self` for chaining.
    pub fn with(mut self, field: AuthField, value: impl Into<String>) -> Self {
        *self.slot(field) = Some(value.into());
        self
    }

    pub fn get(&self, field: AuthField) -> Option<&str> {
        match field {
            AuthField::SessionKey => self.encrypted_session_key.as_deref(),
            AuthField::ExportAuthData => self.encrypted_export_auth_data.as_deref(),
            AuthField::ImportAuthData => self.encrypted_import_auth_data.as_deref(),
            AuthField::PublicKey => self.encrypted_public_key.as_deref(),
            AuthField::PrivateKey => self.encrypted_private_key.as_deref(),
        }
    }

    fn slot(&mut self, field: AuthField) -> &mut Option<String> {
        match field {
            AuthField::SessionKey => &mut self.encrypted_session_key,
            AuthField::ExportAuthData => &mut self.encrypted_export_auth_data,
            AuthField::ImportAuthData => &mut self.encrypted_import_auth_data,
            AuthField::PublicKey => &mut self.encrypted_public_key,
            AuthField::PrivateKey => &mut self.encrypted_private_key,
        }
    }

    fn take(&mut self, field: AuthField) -> Option<Sealed> {
        self.slot(field).take().and_then(Sealed::new)
    }

    /// Checks every field against the presence table for `self.stage`.
    ///
    /// Required fields fail when empty or whitespace-only; forbidden fields
    /// fail when non-empty. Fields are checked in [`AuthField::ALL`] order and
    /// the first violation is reported.
    pub fn check(&self) -> Result<(), JobError> {
        for field in AuthField::ALL {
            let rule = self.stage.presence(field);
            let value = self.get(field).unwrap_or("");
            let violated = match rule {
                Presence::Required => value.trim().is_empty(),
                Presence::Forbidden => !value.is_empty(),
            };
            if violated {
                return Err(JobError::InvalidAuthorizationState {
                    stage: self.stage,
                    field,
                    rule,
                });
            }
        }
        Ok(())
    }

    fn is_unkeyed_default(&self) -> bool {
        self.stage == Stage::Initial
            && self.get(AuthField::SessionKey).is_none_or(|v| v.trim().is_empty())
            && AuthField::ALL[1..]
                .iter()
                .all(|&f| self.get(f).is_none_or(str::is_empty))
    }
}

impl From<Authorization> for AuthorizationFields {
    fn from(auth: Authorization) -> Self {
        let mut fields = AuthorizationFields::new(auth.stage());
        for field in AuthField::ALL {
            if let Some(value) = auth.field(field) {
                *fields.slot(field) = Some(value.as_str().to_string());
            }
        }
        fields
    }
}

impl From<&Authorization> for AuthorizationFields {
    fn from(auth: &Authorization) -> Self {
        auth.clone().into()
    }
}

/// Restores an authorization from its flat form.
///
/// The unkeyed INITIAL default is accepted here so that stored and transported
/// records of brand-new jobs round-trip. Anything else must satisfy
/// [`AuthorizationFields::check`].
impl TryFrom<AuthorizationFields> for Authorization {
    type Error = JobError;

    fn try_from(mut fields: AuthorizationFields) -> Result<Self, Self::Error> {
        if fields.is_unkeyed_default() {
            return Ok(Authorization::default());
        }
        fields.check()?;

        let stage = fields.stage;
        let mut require = |field: AuthField| {
            fields
                .take(field)
                .ok_or(JobError::InvalidAuthorizationState {
                    stage,
                    field,
                    rule: Presence::Required,
                })
        };

        let session_key = require(AuthField::SessionKey)?;
        let auth = match stage {
            Stage::Initial => Authorization::Initial {
                session_key: Some(session_key),
            },
            Stage::CredsAvailable => Authorization::CredsAvailable { session_key },
            Stage::CredsEncryptionKeyGenerated => Authorization::CredsEncryptionKeyGenerated {
                session_key,
                worker_keys: WorkerKeys {
                    public_key: require(AuthField::PublicKey)?,
                    private_key: require(AuthField::PrivateKey)?,
                },
            },
            Stage::CredsEncrypted => Authorization::CredsEncrypted {
                session_key,
                worker_keys: WorkerKeys {
                    public_key: require(AuthField::PublicKey)?,
                    private_key: require(AuthField::PrivateKey)?,
                },
                credentials: EncryptedCredentials {
                    export_auth_data: require(AuthField::ExportAuthData)?,
                    import_auth_data: require(AuthField::ImportAuthData)?,
                },
            },
        };
        Ok(auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fields satisfying exactly the table row for `stage`.
    fn valid_fields(stage: Stage) -> AuthorizationFields {
        AuthField::ALL
            .into_iter()
            .filter(|&f| stage.presence(f) == Presence::Required)
            .fold(AuthorizationFields::new(stage), |fields, f| {
                fields.with(f, format!("enc-{}", f.name()))
            })
    }

    #[test]
    fn every_stage_accepts_its_exact_field_set() {
        for stage in Stage::ALL {
            let fields = valid_fields(stage);
            assert_eq!(fields.check(), Ok(()), "stage {stage}");
            let auth = Authorization::try_from(fields).unwrap();
            assert_eq!(auth.stage(), stage);
        }
    }

    #[test]
    fn missing_any_required_field_is_rejected() {
        for stage in Stage::ALL {
            for field in AuthField::ALL {
                if stage.presence(field) != Presence::Required {
                    continue;
                }
                let mut fields = valid_fields(stage);
                *fields.slot(field) = None;
                assert_eq!(
                    fields.check(),
                    Err(JobError::InvalidAuthorizationState {
                        stage,
                        field,
                        rule: Presence::Required,
                    }),
                    "stage {stage}, field {field}"
                );
            }
        }
    }

    #[test]
    fn populating_any_forbidden_field_is_rejected() {
        for stage in Stage::ALL {
            for field in AuthField::ALL {
                if stage.presence(field) != Presence::Forbidden {
                    continue;
                }
                let fields = valid_fields(stage).with(field, "leaked");
                assert_eq!(
                    Authorization::try_from(fields),
                    Err(JobError::InvalidAuthorizationState {
                        stage,
                        field,
                        rule: Presence::Forbidden,
                    }),
                    "stage {stage}, field {field}"
                );
            }
        }
    }

    #[test]
    fn whitespace_only_required_field_counts_as_empty() {
        let fields = valid_fields(Stage::CredsEncryptionKeyGenerated).with(AuthField::PrivateKey, "  \t");
        assert_eq!(
            fields.check(),
            Err(JobError::InvalidAuthorizationState {
                stage: Stage::CredsEncryptionKeyGenerated,
                field: AuthField::PrivateKey,
                rule: Presence::Required,
            })
        );
    }

    #[test]
    fn whitespace_in_forbidden_field_is_still_populated() {
        let fields = valid_fields(Stage::CredsAvailable).with(AuthField::ExportAuthData, " ");
        assert!(matches!(
            fields.check(),
            Err(JobError::InvalidAuthorizationState {
                field: AuthField::ExportAuthData,
                rule: Presence::Forbidden,
                ..
            })
        ));
    }

    #[test]
    fn empty_string_in_forbidden_field_is_allowed() {
        let fields = valid_fields(Stage::Initial).with(AuthField::PublicKey, "");
        assert_eq!(fields.check(), Ok(()));
        let auth = Authorization::try_from(fields).unwrap();
        assert!(auth.worker_keys().is_none());
    }

    #[test]
    fn unkeyed_initial_restores_but_fails_the_table() {
        let fields = AuthorizationFields::new(Stage::Initial).with(AuthField::SessionKey, "");
        assert!(fields.check().is_err());
        assert_eq!(Authorization::try_from(fields), Ok(Authorization::default()));
        assert!(Authorization::default().is_unkeyed());
    }

    #[test]
    fn typed_value_flattens_to_its_populated_fields() {
        let auth = Authorization::CredsEncryptionKeyGenerated {
            session_key: Sealed::new("s").unwrap(),
            worker_keys: WorkerKeys {
                public_key: Sealed::new("pub").unwrap(),
                private_key: Sealed::new("priv").unwrap(),
            },
        };
        let fields = AuthorizationFields::from(&auth);
        assert_eq!(fields.get(AuthField::SessionKey), Some("s"));
        assert_eq!(fields.get(AuthField::PublicKey), Some("pub"));
        assert_eq!(fields.get(AuthField::PrivateKey), Some("priv"));
        assert_eq!(fields.get(AuthField::ExportAuthData), None);
        assert_eq!(Authorization::try_from(fields), Ok(auth));
    }

    #[test]
    fn stage_names_parse_and_display() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>(), Ok(stage));
            assert_eq!(stage.to_string(), stage.as_str());
        }
        assert_eq!(
            "DONE".parse::<Stage>(),
            Err(JobError::UnknownStage("DONE".into()))
        );
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Initial < Stage::CredsAvailable);
        assert!(Stage::CredsAvailable < Stage::CredsEncryptionKeyGenerated);
        assert!(Stage::CredsEncryptionKeyGenerated < Stage::CredsEncrypted);
    }

    #[test]
    fn sealed_rejects_blank_and_hides_contents() {
        assert!(Sealed::new("").is_none());
        assert!(Sealed::new("   ").is_none());
        let sealed = Sealed::new("secret").unwrap();
        assert_eq!(sealed.as_str(), "secret");
        assert_eq!(format!("{sealed:?}"), "Sealed(6 bytes)");
    }

    #[test]
    fn json_rejects_inconsistent_authorization() {
        let json = r#"{"stage":"CREDS_AVAILABLE","encryptedSessionKey":"k","encryptedPublicKey":"p"}"#;
        assert!(serde_json::from_str::<Authorization>(json).is_err());

        let json = r#"{"stage":"CREDS_AVAILABLE","encryptedSessionKey":"k"}"#;
        let auth: Authorization = serde_json::from_str(json).unwrap();
        assert_eq!(auth.stage(), Stage::CredsAvailable);
    }
}
