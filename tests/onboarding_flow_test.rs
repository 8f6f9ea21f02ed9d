#[cfg(test)]
mod onboarding_flow_integration_tests {
    use portalserver::companies::responses_to_csv;
    use portalserver::intake::draft::{self, DraftContext, Patch};
    use portalserver::intake::forms;
    use portalserver::invites::{accept_decision, invite_link, AcceptDecision};
    use portalserver::membership::CompanyRole;
    use portalserver::secrets::vault;
    use serde_json::{json, Value};

    fn wizard_values() -> forms::Values {
        let mut values = forms::Values::new();
        values.insert("company_name".to_string(), json!("Acme"));
        values.insert("website".to_string(), json!("https://acme.test"));
        values.insert("selected_services".to_string(), json!(["SEO", "PPC"]));
        values.insert("seo_goals".to_string(), json!("Own the snippet box"));
        values.insert("ppc_monthly_budget".to_string(), json!(2500));
        values.insert(
            "social_profiles".to_string(),
            json!("https://social.example/acme"),
        );
        values.insert("analytics_platform".to_string(), json!("GA4"));
        values.insert("website_platform".to_string(), json!("WordPress"));
        values.insert("email_platform".to_string(), json!("Mailchimp"));
        values
    }

    #[test]
    fn first_section_save_pipeline_shapes_a_storable_payload() {
        let values = wizard_values();

        // Per-section saves tolerate the incomplete payload.
        assert!(forms::validate_partial(&values).is_ok());

        // The company wizard tab lands in the "business" section row.
        let section = forms::find_section("company").expect("company section exists");
        assert_eq!(forms::storage_section_key(section.key), "business");

        let payload = forms::section_payload(section, &values);
        assert_eq!(payload.get("company_name"), Some(&json!("Acme")));
        assert_eq!(payload.get("website"), Some(&json!("https://acme.test")));
        // Fields from other sections never leak into this row.
        assert!(!payload.contains_key("seo_goals"));

        // Service display names resolve to catalog keys for the header.
        let keys = draft::selected_display_services(&values);
        let resolved = forms::resolve_service_keys(&keys);
        assert_eq!(resolved, vec!["seo".to_string(), "ppc".to_string()]);
    }

    #[test]
    fn submission_requires_every_section_before_it_finalizes() {
        let mut values = wizard_values();
        assert!(forms::validate_strict(&values).is_ok());

        values.remove("analytics_platform");
        assert_eq!(
            forms::validate_strict(&values).unwrap_err(),
            "Analytics platform is required"
        );
    }

    #[test]
    fn profile_patches_keep_clear_and_set_per_field() {
        let mut values = forms::Values::new();
        values.insert("website".to_string(), Value::Null);
        values.insert("industry".to_string(), json!("Retail"));

        let patch = draft::company_profile_patch(&values);
        assert_eq!(patch.website, Patch::Clear);
        assert_eq!(patch.industry, Patch::Set("Retail".to_string()));
        assert_eq!(patch.country, Patch::Keep);

        assert_eq!(patch.website.apply(Some("https://old.example".into())), None);
        assert_eq!(
            patch.country.apply(Some("NZ".to_string())),
            Some("NZ".to_string())
        );
    }

    #[test]
    fn draft_context_round_trips_between_wizard_steps() {
        let context: DraftContext = serde_json::from_value(json!({
            "companyId": "7f3b1d66-8ef6-4b9a-b2f3-0e1d2c3b4a59",
            "questionnaireId": "1f0a2b3c-4d5e-6f70-8192-a3b4c5d6e7f8"
        }))
        .expect("wizard context deserializes");

        assert!(context.company_id.is_some());
        assert!(context.questionnaire_id.is_some());
    }

    #[test]
    fn invite_flow_decisions_cover_issue_and_accept() {
        assert!(CompanyRole::ClientAdmin.can_invite());
        assert!(!CompanyRole::Viewer.can_invite());

        let link = invite_link("https://portal.example", "0badc0de");
        assert_eq!(link, "https://portal.example/sign-in?invite=0badc0de");

        // Matching email accepts, case-insensitively.
        assert_eq!(
            accept_decision(false, "Client@Example.com", "client@example.com"),
            AcceptDecision::Accept
        );

        // A consumed token is a no-op for whoever presents it.
        assert_eq!(
            accept_decision(true, "client@example.com", "intruder@example.com"),
            AcceptDecision::AlreadyAccepted
        );

        // A mismatch names the address the invite was sent to.
        match accept_decision(false, "client@example.com", "other@example.com") {
            AcceptDecision::EmailMismatch { expected } => {
                assert_eq!(expected, "client@example.com");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn stored_credentials_round_trip_through_the_vault() {
        let passphrase = "integration-test-passphrase";

        let sealed = vault::encrypt_value(passphrase, "sk-live-123").expect("encrypts");
        assert!(!sealed.contains("sk-live-123"));

        let revealed = vault::decrypt_value(passphrase, &sealed).expect("decrypts");
        assert_eq!(revealed, "sk-live-123");

        assert!(vault::decrypt_value("some-other-passphrase-here", &sealed).is_err());
    }

    #[test]
    fn viewer_role_never_reaches_the_vault() {
        for role in ["viewer", "client_member", "agency_member"] {
            let role: CompanyRole = role.parse().expect("known role");
            assert!(!role.can_manage_secrets());
        }
    }

    #[test]
    fn export_rows_survive_a_csv_round_trip() {
        let mut business = serde_json::Map::new();
        business.insert("company_name".to_string(), json!("Acme \"Labs\", Inc."));
        let mut seo = serde_json::Map::new();
        seo.insert("seo_goals".to_string(), json!("rank\nclimb"));

        let csv_text = responses_to_csv(&[
            ("business".to_string(), business),
            ("seo".to_string(), seo),
        ])
        .expect("export writes");

        assert!(csv_text.starts_with("section,field,value\n"));

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv_text.as_bytes());
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["business", "company_name", "Acme \"Labs\", Inc."]);
        assert_eq!(rows[1], vec!["seo", "seo_goals", "rank\nclimb"]);
    }
}
