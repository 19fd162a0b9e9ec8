use serde::Serialize;

/// Request identity resolved from the two credential sources the platform
/// supports: an SSO session and a locally persisted credential. Resolution
/// happens once per request; there is no process-wide identity state.
#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Session<U> {
    Anonymous,
    Local { user: U },
    Sso { user: U },
}

/// Precedence: SSO > Local > Anonymous.
///
/// Callers pass the user each source resolved to (None when the source was
/// absent or its identity matched no user row), so a dangling SSO identity
/// falls through to the local credential instead of failing the request.
pub fn resolve<U>(sso: Option<U>, local: Option<U>) -> Session<U> {
    match (sso, local) {
        (Some(user), _) => Session::Sso { user },
        (None, Some(user)) => Session::Local { user },
        (None, None) => Session::Anonymous,
    }
}
