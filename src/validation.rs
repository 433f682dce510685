//! Validation System - Rule/Policy Separation
//!
//! Rules inspect a template configuration and produce structured violations.
//! Policy: any error-severity violation makes the template invalid;
//! warnings are reported but never block.

use serde::{Deserialize, Serialize};

use crate::color::Rgba;
use crate::templates::{Template, MAX_DESIGN_FILE_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
    pub template_id: String,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn issues(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.message.clone()).collect()
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, template: &Template) -> Vec<ValidationViolation>;
}

fn violation(
    rule: &dyn ValidationRule,
    severity: ViolationSeverity,
    message: impl Into<String>,
    remediation: &str,
) -> ValidationViolation {
    ValidationViolation {
        rule: rule.name().to_string(),
        severity,
        message: message.into(),
        expected: None,
        actual: None,
        remediation: vec![remediation.to_string()],
    }
}

// --- Concrete Rules ---

pub struct RequiredFieldsRule;

impl ValidationRule for RequiredFieldsRule {
    fn name(&self) -> &'static str { "required_fields" }

    fn validate(&self, template: &Template) -> Vec<ValidationViolation> {
        [
            (&template.id, "Missing template ID"),
            (&template.name, "Missing template name"),
            (&template.description, "Missing template description"),
        ]
        .into_iter()
        .filter(|(value, _)| value.trim().is_empty())
        .map(|(_, message)| {
            violation(self, ViolationSeverity::Error, message, "Fill in the field in the catalog")
        })
        .collect()
    }
}

pub struct DesignFileSizeRule;

impl ValidationRule for DesignFileSizeRule {
    fn name(&self) -> &'static str { "design_file_size" }

    fn validate(&self, template: &Template) -> Vec<ValidationViolation> {
        if template.design_file.is_none() {
            return vec![];
        }
        match template.design_file_size {
            None => vec![violation(
                self,
                ViolationSeverity::Error,
                "Design file specified but no file size provided",
                "Add designFileSize (bytes) to the template",
            )],
            Some(size) if size > MAX_DESIGN_FILE_SIZE && template.available => {
                vec![ValidationViolation {
                    expected: Some(format!("<= {MAX_DESIGN_FILE_SIZE} bytes or available: false")),
                    actual: Some(format!("{size} bytes")),
                    ..violation(
                        self,
                        ViolationSeverity::Error,
                        "Large design file should be marked as unavailable",
                        "Set available to false or shrink the design file",
                    )
                }]
            }
            Some(_) => vec![],
        }
    }
}

pub struct AvailabilityReasonRule;

impl ValidationRule for AvailabilityReasonRule {
    fn name(&self) -> &'static str { "availability_reason" }

    fn validate(&self, template: &Template) -> Vec<ValidationViolation> {
        if !template.available && template.unavailable_reason.is_none() {
            vec![violation(
                self,
                ViolationSeverity::Warning,
                "Unavailable template should include reason",
                "Add unavailableReason",
            )]
        } else {
            vec![]
        }
    }
}

pub struct PrimaryColorRule;

impl ValidationRule for PrimaryColorRule {
    fn name(&self) -> &'static str { "primary_color" }

    fn validate(&self, template: &Template) -> Vec<ValidationViolation> {
        match template.primary_color.as_deref() {
            Some(hex) if Rgba::from_hex(hex).is_err() => vec![ValidationViolation {
                expected: Some("#RRGGBB".to_string()),
                actual: Some(hex.to_string()),
                ..violation(
                    self,
                    ViolationSeverity::Warning,
                    "Primary color is not a six-digit hex color",
                    "The background color will be left unset",
                )
            }],
            _ => vec![],
        }
    }
}

/// Design files must be ones the file server will hand out.
pub struct DesignFileAllowlistRule {
    pub allowlist: Vec<String>,
}

impl ValidationRule for DesignFileAllowlistRule {
    fn name(&self) -> &'static str { "design_file_allowlist" }

    fn validate(&self, template: &Template) -> Vec<ValidationViolation> {
        match &template.design_file {
            Some(file) if !self.allowlist.iter().any(|a| a == file) => vec![ValidationViolation {
                actual: Some(file.clone()),
                ..violation(
                    self,
                    ViolationSeverity::Error,
                    "Design file is not served by the file server",
                    "Add the file to the server allowlist",
                )
            }],
            _ => vec![],
        }
    }
}

/// Validator orchestrates rules and applies policy
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(RequiredFieldsRule),
                Box::new(DesignFileSizeRule),
                Box::new(AvailabilityReasonRule),
                Box::new(PrimaryColorRule),
            ],
        }
    }

    /// Also require design files to be on the server's allowlist.
    pub fn with_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.rules.push(Box::new(DesignFileAllowlistRule { allowlist }));
        self
    }

    pub fn validate(&self, template: &Template) -> ValidationResult {
        let violations: Vec<_> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(template))
            .collect();
        let valid = !violations.iter().any(|v| v.severity == ViolationSeverity::Error);
        ValidationResult {
            valid,
            violations,
            template_id: template.id.clone(),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
