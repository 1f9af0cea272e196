use crate::context::OpContext;
use crate::operation::{Classification, Operation};
use crate::CoreError;
use bringup_runtime::device;

/// Reset the administrative password to the operator-configured value.
/// Only scheduled for REVERSE runs with `[credentials] reset_admin_password`.
pub struct CredentialOp {
    user: String,
    password: String,
}

impl CredentialOp {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for CredentialOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialOp")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Operation for CredentialOp {
    fn name(&self) -> String {
        "credential".to_owned()
    }

    fn classification(&self) -> Classification {
        Classification::Warn
    }

    /// The current password cannot be read back, so the reset always runs.
    fn precheck(&self, _ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        Ok(false)
    }

    fn apply(&self, ctx: &OpContext<'_>) -> Result<(), CoreError> {
        ctx.must(
            &device::set_password(&self.user, &self.password),
            ctx.check_timeout(),
        )?;
        Ok(())
    }

    fn postcheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        Ok(ctx.query(&device::probe())?.success())
    }
}
