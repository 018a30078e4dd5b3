//! Feature identity values used to tag instruments.

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

/// Identifies an application and a functional unit ("feature") within it.
///
/// Descriptors are plain values: any two with equal fields are
/// interchangeable for tagging purposes, and the metrics layer never
/// distinguishes them by identity. They are supplied by the surrounding
/// application's feature registry, not discovered here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DescriptorFields")]
pub struct FeatureDescriptor {
    application: String,
    feature_id: String,
}

impl FeatureDescriptor {
    /// Create a descriptor from an application name and a feature id.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidArgument`] if either field is empty or
    /// whitespace-only.
    pub fn new(application: impl Into<String>, feature_id: impl Into<String>) -> Result<Self> {
        let application = application.into();
        let feature_id = feature_id.into();
        require_non_blank("application", &application)?;
        require_non_blank("feature id", &feature_id)?;
        Ok(Self {
            application,
            feature_id,
        })
    }

    /// Application the feature belongs to.
    #[must_use]
    pub fn application(&self) -> &str {
        &self.application
    }

    /// Identifier of the feature within the application.
    #[must_use]
    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }
}

/// Raw wire shape; deserialization funnels through [`FeatureDescriptor::new`]
/// so blank fields are rejected on that path too.
#[derive(Deserialize)]
struct DescriptorFields {
    application: String,
    feature_id: String,
}

impl TryFrom<DescriptorFields> for FeatureDescriptor {
    type Error = MetricsError;

    fn try_from(fields: DescriptorFields) -> Result<Self> {
        Self::new(fields.application, fields.feature_id)
    }
}

/// Reject empty or whitespace-only values for required string arguments.
pub(crate) fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MetricsError::InvalidArgument(format!(
            "{field} must not be blank"
        )));
    }
    Ok(())
}
