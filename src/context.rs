use uuid::Uuid;

/// Caller identity and tracing ids carried into every service call.
///
/// `owner_id` scopes all project lookups: a project that belongs to a
/// different owner is reported as not found.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub owner_id: String,
    pub correlation_id: Option<Uuid>,
}

impl RequestContext {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            correlation_id: None,
        }
    }

    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }
}

#[derive(Default)]
pub struct RequestContextBuilder {
    owner_id: Option<String>,
    correlation_id: Option<Uuid>,
}

impl RequestContextBuilder {
    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Fails when no owner was supplied.
    pub fn build(self) -> crate::Result<RequestContext> {
        let owner_id = self
            .owner_id
            .filter(|o| !o.is_empty())
            .ok_or_else(|| crate::Error::Validation("owner id is required".into()))?;
        Ok(RequestContext {
            owner_id,
            correlation_id: self.correlation_id,
        })
    }
}
