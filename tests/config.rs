use assert_matches::assert_matches;

use proteomics_archiver::config::{
    Config, ConfigLoader, EndpointConfig, EndpointKind, ExperimentIds, KeywordTranslationEntry,
    ResolvedDestination, ResolvedSource,
};
use proteomics_archiver::error::ArchiverError;

const FULL_CONFIG: &str = r#"{
    "project_name": "PXD000001",
    "submission_name": "MSV000123",
    "source": {
        "kind": "sftp",
        "host": "ip2.example.org",
        "username": "lab",
        "password": "secret",
        "project_base_path": "/ip2/lab/projects"
    },
    "destination": {
        "kind": "sftp",
        "host": "massive.example.org",
        "port": 2222,
        "username": "MSV000123",
        "key_path": "/home/lab/.ssh/id_ed25519"
    },
    "size_tolerance": 1024,
    "override_existing": true,
    "keyword_translations": [
        {"from": "wt", "to": "WT"},
        {"from": "ko", "to": "KO"}
    ],
    "special_folders": ["projects", "experiments"],
    "experiment_ids": "17605, 17606",
    "root_folder": "/incoming"
}"#;

#[test]
fn full_config_resolves() {
    let config: Config = serde_json::from_str(FULL_CONFIG).unwrap();
    let resolved = ConfigLoader::resolve_config(config).unwrap();

    assert_eq!(resolved.project_name, "PXD000001");
    assert_eq!(resolved.submission_name.as_deref(), Some("MSV000123"));
    assert_eq!(resolved.project_base_path.as_deref(), Some("/ip2/lab/projects"));
    assert_matches!(&resolved.source, ResolvedSource::Sftp(endpoint) if endpoint.port == 22);
    assert_matches!(
        resolved.destination,
        Some(ResolvedDestination::Sftp(ref endpoint)) if endpoint.port == 2222 && endpoint.password.is_none()
    );
    assert_eq!(resolved.size_tolerance, 1024);
    assert!(resolved.override_existing);
    assert_eq!(
        resolved.keyword_translations,
        vec![
            ("wt".to_string(), "WT".to_string()),
            ("ko".to_string(), "KO".to_string())
        ]
    );
    assert_eq!(resolved.special_folders, vec!["projects", "experiments"]);
    assert_eq!(resolved.experiment_ids, vec![17605, 17606]);
    assert_eq!(resolved.layout.root, "/incoming");
    assert!(!resolved.layout.preserve_tree);
}

#[test]
fn experiment_ids_accept_a_list() {
    let config: Config = serde_json::from_str(
        r#"{"project_name": "P", "source": {"kind": "local"}, "experiment_ids": [1, 2]}"#,
    )
    .unwrap();
    assert_matches!(config.experiment_ids, Some(ExperimentIds::List(_)));
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.experiment_ids, vec![1, 2]);
}

#[test]
fn malformed_experiment_ids_are_rejected() {
    let config: Config = serde_json::from_str(
        r#"{"project_name": "P", "source": {"kind": "local"}, "experiment_ids": "1,two"}"#,
    )
    .unwrap();
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, ArchiverError::InvalidProperty { property, .. } if property == "experiment_ids");
}

#[test]
fn missing_project_name() {
    let config = Config {
        source: Some(EndpointConfig::new(EndpointKind::Local)),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, ArchiverError::MissingProperty(property) if property == "project_name");
}

#[test]
fn sftp_source_needs_a_host() {
    let mut source = EndpointConfig::new(EndpointKind::Sftp);
    source.username = Some("lab".to_string());
    let config = Config {
        project_name: Some("P".to_string()),
        source: Some(source),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, ArchiverError::MissingProperty(property) if property == "source.host");
}

#[test]
fn drive_cannot_be_a_source() {
    let config = Config {
        project_name: Some("P".to_string()),
        source: Some(EndpointConfig::new(EndpointKind::Drive)),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, ArchiverError::InvalidProperty { .. });
}

#[test]
fn empty_translation_key_is_rejected() {
    let config = Config {
        project_name: Some("P".to_string()),
        source: Some(EndpointConfig::new(EndpointKind::Local)),
        keyword_translations: vec![KeywordTranslationEntry {
            from: String::new(),
            to: "x".to_string(),
        }],
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, ArchiverError::InvalidProperty { .. });
}

#[test]
fn drive_destination_with_explicit_tree_setting() {
    let mut destination = EndpointConfig::new(EndpointKind::Drive);
    destination.access_token = Some("ya29.token".to_string());
    let config = Config {
        project_name: Some("P".to_string()),
        source: Some(EndpointConfig::new(EndpointKind::Local)),
        destination: Some(destination),
        preserve_tree: Some(false),
        root_folder: Some("Shared/raw".to_string()),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_matches!(
        resolved.require_destination(),
        Ok(ResolvedDestination::Drive { access_token }) if access_token == "ya29.token"
    );
    assert_eq!(resolved.layout.root, "Shared/raw");
    assert!(!resolved.layout.preserve_tree);
}

#[test]
fn local_destination_needs_a_path() {
    let config = Config {
        project_name: Some("P".to_string()),
        source: Some(EndpointConfig::new(EndpointKind::Local)),
        destination: Some(EndpointConfig::new(EndpointKind::Local)),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, ArchiverError::MissingProperty(property) if property == "destination.path");
}

#[test]
fn explicit_config_path_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("missing.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, ArchiverError::ConfigRead(_));
}

#[test]
fn invalid_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("archiver.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, ArchiverError::ConfigParse(_));
}
