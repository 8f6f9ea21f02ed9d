use serde_json::Value;

use crate::shared::utils::is_valid_email;

pub type Values = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Email,
    Url,
    Number,
    Textarea,
    Checkbox,
    Select(&'static [&'static str]),
    Multiselect(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct FormField {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FormSection {
    pub key: &'static str,
    pub title: &'static str,
    pub fields: &'static [FormField],
}

/// Display name -> internal service key. Unknown display names are
/// silently dropped during resolution.
pub const SERVICE_CATALOG: &[(&str, &str)] = &[
    ("SEO", "seo"),
    ("PPC", "ppc"),
    ("Social Media", "social"),
    ("Analytics and Tagging", "analytics"),
    ("Website Development", "webdev"),
    ("Email Marketing", "email"),
    ("Conversion Rate Optimization", "cro"),
    ("Local SEO and Listings", "local"),
];

const SERVICE_DISPLAY_NAMES: &[&str] = &[
    "SEO",
    "PPC",
    "Social Media",
    "Analytics and Tagging",
    "Website Development",
    "Email Marketing",
    "Conversion Rate Optimization",
    "Local SEO and Listings",
];

/// The intake questionnaire, one section per tab of the wizard.
pub const SECTIONS: &[FormSection] = &[
    FormSection {
        key: "company",
        title: "Company",
        fields: &[
            FormField {
                key: "company_name",
                label: "Company name",
                kind: FieldKind::Text,
                required: true,
            },
            FormField {
                key: "website",
                label: "Website",
                kind: FieldKind::Url,
                required: false,
            },
            FormField {
                key: "industry",
                label: "Industry",
                kind: FieldKind::Text,
                required: false,
            },
            FormField {
                key: "business_type",
                label: "Business type",
                kind: FieldKind::Select(&["B2B", "B2C", "B2B2C", "Marketplace", "Nonprofit"]),
                required: false,
            },
            FormField {
                key: "country",
                label: "Country",
                kind: FieldKind::Text,
                required: false,
            },
            FormField {
                key: "timezone",
                label: "Timezone",
                kind: FieldKind::Text,
                required: false,
            },
        ],
    },
    FormSection {
        key: "services",
        title: "Services",
        fields: &[FormField {
            key: "selected_services",
            label: "Selected services",
            kind: FieldKind::Multiselect(SERVICE_DISPLAY_NAMES),
            required: true,
        }],
    },
    FormSection {
        key: "seo",
        title: "SEO",
        fields: &[
            FormField {
                key: "seo_goals",
                label: "SEO goals",
                kind: FieldKind::Textarea,
                required: true,
            },
            FormField {
                key: "target_keywords",
                label: "Target keywords",
                kind: FieldKind::Textarea,
                required: false,
            },
            FormField {
                key: "competitor_urls",
                label: "Competitor URLs",
                kind: FieldKind::Textarea,
                required: false,
            },
            FormField {
                key: "has_existing_content",
                label: "Existing content plan",
                kind: FieldKind::Checkbox,
                required: false,
            },
        ],
    },
    FormSection {
        key: "ppc",
        title: "Paid search",
        fields: &[
            FormField {
                key: "ppc_monthly_budget",
                label: "Monthly paid media budget",
                kind: FieldKind::Number,
                required: true,
            },
            FormField {
                key: "ppc_platforms",
                label: "Advertising platforms",
                kind: FieldKind::Multiselect(&[
                    "Google Ads",
                    "Microsoft Ads",
                    "Meta Ads",
                    "LinkedIn Ads",
                ]),
                required: false,
            },
            FormField {
                key: "ppc_goals",
                label: "Paid media goals",
                kind: FieldKind::Textarea,
                required: false,
            },
        ],
    },
    FormSection {
        key: "social",
        title: "Social media",
        fields: &[
            FormField {
                key: "social_profiles",
                label: "Social profiles",
                kind: FieldKind::Textarea,
                required: true,
            },
            FormField {
                key: "social_posting_frequency",
                label: "Posting frequency",
                kind: FieldKind::Select(&["Daily", "Weekly", "Biweekly", "Monthly"]),
                required: false,
            },
            FormField {
                key: "social_goals",
                label: "Social goals",
                kind: FieldKind::Textarea,
                required: false,
            },
        ],
    },
    FormSection {
        key: "analytics",
        title: "Analytics",
        fields: &[
            FormField {
                key: "analytics_platform",
                label: "Analytics platform",
                kind: FieldKind::Select(&["GA4", "Matomo", "Adobe Analytics", "None"]),
                required: true,
            },
            FormField {
                key: "tag_manager_in_use",
                label: "Tag manager in use",
                kind: FieldKind::Checkbox,
                required: false,
            },
            FormField {
                key: "tracking_requirements",
                label: "Tracking requirements",
                kind: FieldKind::Textarea,
                required: false,
            },
        ],
    },
    FormSection {
        key: "webdev",
        title: "Website development",
        fields: &[
            FormField {
                key: "website_platform",
                label: "Website platform",
                kind: FieldKind::Text,
                required: true,
            },
            FormField {
                key: "hosting_provider",
                label: "Hosting provider",
                kind: FieldKind::Text,
                required: false,
            },
            FormField {
                key: "planned_changes",
                label: "Planned changes",
                kind: FieldKind::Textarea,
                required: false,
            },
        ],
    },
    FormSection {
        key: "email",
        title: "Email marketing",
        fields: &[
            FormField {
                key: "email_platform",
                label: "Email platform",
                kind: FieldKind::Text,
                required: true,
            },
            FormField {
                key: "list_size",
                label: "List size",
                kind: FieldKind::Number,
                required: false,
            },
            FormField {
                key: "email_goals",
                label: "Email goals",
                kind: FieldKind::Textarea,
                required: false,
            },
        ],
    },
];

pub fn find_section(key: &str) -> Option<&'static FormSection> {
    SECTIONS.iter().find(|section| section.key == key)
}

/// UI section key -> storage section key. Identity for everything that
/// has no remapping.
pub fn storage_section_key(ui_key: &str) -> &str {
    match ui_key {
        "company" => "business",
        other => other,
    }
}

pub fn service_key_for_display(display: &str) -> Option<&'static str> {
    SERVICE_CATALOG
        .iter()
        .find(|(name, _)| *name == display)
        .map(|(_, key)| *key)
}

pub fn display_for_service_key(key: &str) -> String {
    SERVICE_CATALOG
        .iter()
        .find(|(_, k)| *k == key)
        .map(|(name, _)| (*name).to_string())
        .unwrap_or_else(|| key.to_uppercase())
}

/// Resolve display names to internal keys, dropping unknown names and
/// duplicates while preserving order.
pub fn resolve_service_keys(display_names: &[String]) -> Vec<String> {
    let mut keys = Vec::new();
    for name in display_names {
        if let Some(key) = service_key_for_display(name) {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }
    keys
}

fn required_message(field: &FormField) -> String {
    format!("{} is required", field.label)
}

fn check_field_value(field: &FormField, value: &Value) -> Result<(), String> {
    match field.kind {
        FieldKind::Text | FieldKind::Textarea => {
            if value.is_string() {
                Ok(())
            } else {
                Err(format!("{} must be text", field.label))
            }
        }
        FieldKind::Email => match value.as_str() {
            Some(s) if s.trim().is_empty() || is_valid_email(s) => Ok(()),
            _ => Err("Enter a valid email address".to_string()),
        },
        FieldKind::Url => match value.as_str() {
            Some(s)
                if s.trim().is_empty()
                    || s.starts_with("http://")
                    || s.starts_with("https://") =>
            {
                Ok(())
            }
            _ => Err("Enter a valid URL, e.g. https://example.com".to_string()),
        },
        FieldKind::Number => {
            let ok = value.is_number()
                || value
                    .as_str()
                    .map(|s| s.trim().is_empty() || s.trim().parse::<f64>().is_ok())
                    .unwrap_or(false);
            if ok {
                Ok(())
            } else {
                Err(format!("{} must be a number", field.label))
            }
        }
        FieldKind::Checkbox => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err(format!("{} must be a checkbox value", field.label))
            }
        }
        FieldKind::Select(options) => match value.as_str() {
            Some(s) if s.is_empty() || options.contains(&s) => Ok(()),
            _ => Err(format!("Select a valid option for {}", field.label)),
        },
        FieldKind::Multiselect(_) => match value.as_array() {
            Some(items) if items.iter().all(Value::is_string) => Ok(()),
            _ => Err(format!("{} must be a list of options", field.label)),
        },
    }
}

fn value_satisfies_required(field: &FormField, value: &Value) -> bool {
    match field.kind {
        FieldKind::Text
        | FieldKind::Textarea
        | FieldKind::Email
        | FieldKind::Url
        | FieldKind::Select(_) => value.as_str().map(|s| !s.trim().is_empty()).unwrap_or(false),
        FieldKind::Number => {
            value.is_number()
                || value
                    .as_str()
                    .map(|s| s.trim().parse::<f64>().is_ok())
                    .unwrap_or(false)
        }
        FieldKind::Checkbox => value.as_bool().unwrap_or(false),
        FieldKind::Multiselect(_) => value.as_array().map(|a| !a.is_empty()).unwrap_or(false),
    }
}

/// Per-section saves accept incomplete payloads; provided values still
/// have to type-check.
pub fn validate_partial(values: &Values) -> Result<(), String> {
    for section in SECTIONS {
        for field in section.fields {
            if let Some(value) = values.get(field.key) {
                if value.is_null() {
                    continue;
                }
                check_field_value(field, value)?;
            }
        }
    }
    Ok(())
}

/// Submission validation: every required field of every section must be
/// present and non-empty. The first failing field's message is surfaced.
pub fn validate_strict(values: &Values) -> Result<(), String> {
    for section in SECTIONS {
        for field in section.fields {
            match values.get(field.key) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(required_message(field));
                    }
                }
                Some(value) => {
                    check_field_value(field, value)?;
                    if field.required && !value_satisfies_required(field, value) {
                        return Err(required_message(field));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Shape the stored payload for one section: only declared fields are
/// kept; declared fields the caller did not provide are stored as null.
pub fn section_payload(section: &FormSection, values: &Values) -> Values {
    let mut payload = Values::new();
    for field in section.fields {
        payload.insert(
            field.key.to_string(),
            values.get(field.key).cloned().unwrap_or(Value::Null),
        );
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    pub fn full_payload() -> Values {
        values(&[
            ("company_name", json!("Acme")),
            ("website", json!("https://acme.test")),
            ("selected_services", json!(["SEO", "PPC"])),
            ("seo_goals", json!("Rank for everything")),
            ("ppc_monthly_budget", json!(2500)),
            ("social_profiles", json!("https://example.com/acme")),
            ("analytics_platform", json!("GA4")),
            ("website_platform", json!("WordPress")),
            ("email_platform", json!("Mailchimp")),
        ])
    }

    #[test]
    fn section_keys_map_to_storage_keys() {
        assert_eq!(storage_section_key("company"), "business");
        assert_eq!(storage_section_key("seo"), "seo");
        assert_eq!(storage_section_key("webdev"), "webdev");
    }

    #[test]
    fn unknown_display_names_are_dropped() {
        let resolved = resolve_service_keys(&[
            "SEO".to_string(),
            "Skywriting".to_string(),
            "PPC".to_string(),
            "SEO".to_string(),
        ]);
        assert_eq!(resolved, vec!["seo".to_string(), "ppc".to_string()]);
    }

    #[test]
    fn display_lookup_falls_back_to_uppercase() {
        assert_eq!(display_for_service_key("social"), "Social Media");
        assert_eq!(display_for_service_key("mystery"), "MYSTERY");
    }

    #[test]
    fn partial_validation_accepts_incomplete_payloads() {
        let payload = values(&[("company_name", json!("Acme"))]);
        assert!(validate_partial(&payload).is_ok());
    }

    #[test]
    fn partial_validation_still_type_checks() {
        let payload = values(&[("website", json!("not a url"))]);
        let err = validate_partial(&payload).unwrap_err();
        assert_eq!(err, "Enter a valid URL, e.g. https://example.com");

        let payload = values(&[("ppc_monthly_budget", json!("lots"))]);
        assert!(validate_partial(&payload).is_err());
    }

    #[test]
    fn strict_validation_reports_first_missing_required_field() {
        let err = validate_strict(&Values::new()).unwrap_err();
        assert_eq!(err, "Company name is required");

        let mut payload = full_payload();
        payload.remove("seo_goals");
        assert_eq!(validate_strict(&payload).unwrap_err(), "SEO goals is required");
    }

    #[test]
    fn strict_validation_accepts_a_full_payload() {
        assert!(validate_strict(&full_payload()).is_ok());
    }

    #[test]
    fn strict_validation_rejects_empty_required_values() {
        let mut payload = full_payload();
        payload.insert("selected_services".to_string(), json!([]));
        assert_eq!(
            validate_strict(&payload).unwrap_err(),
            "Selected services is required"
        );
    }

    #[test]
    fn section_payload_keeps_only_declared_fields() {
        let section = find_section("company").unwrap();
        let payload = section_payload(
            section,
            &values(&[
                ("company_name", json!("Acme")),
                ("seo_goals", json!("should not appear")),
            ]),
        );

        assert_eq!(payload.get("company_name"), Some(&json!("Acme")));
        assert_eq!(payload.get("website"), Some(&Value::Null));
        assert!(!payload.contains_key("seo_goals"));
        assert_eq!(payload.len(), section.fields.len());
    }
}
