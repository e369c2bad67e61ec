use spdedupe_core::{
    ContentHash, DuplicateGroup, FileDescriptor, HashAlgorithm, ReplacementRequest, ScanReport,
    ScanStatus,
};

fn descriptor(id: &str, hash: &str) -> FileDescriptor {
    FileDescriptor {
        id: id.into(),
        name: format!("{id}.docx"),
        path: format!("/Shared/{id}.docx"),
        size: 2048,
        hash: hash.into(),
        hash_algorithm: Some(HashAlgorithm::QuickXor),
        last_modified: None,
        web_url: format!("https://contoso.sharepoint.com/Shared/{id}.docx"),
        site_id: "site-1".into(),
        drive_id: "drive-1".into(),
    }
}

#[test]
fn test_scan_report_json_shape() {
    let mut report = ScanReport::new("https://contoso.sharepoint.com/sites/team");
    report.complete(
        3,
        vec![DuplicateGroup::new(
            ContentHash::new(HashAlgorithm::QuickXor, "X"),
            vec![descriptor("a", "X"), descriptor("b", "X")],
        )],
    );

    let json = serde_json::to_value(&report).unwrap();
    for field in [
        "scanId",
        "scanDate",
        "siteUrl",
        "totalFilesScanned",
        "duplicateFilesFound",
        "totalSpaceWasted",
        "duplicateGroups",
        "status",
    ] {
        assert!(json.get(field).is_some(), "missing {field}");
    }
    assert_eq!(json["status"], "Completed");
    assert!(json.get("errorMessage").is_none());

    let group = &json["duplicateGroups"][0];
    assert_eq!(group["hash"], "X");
    assert_eq!(group["hashAlgorithm"], "quickXor");
    assert_eq!(group["fileSize"], 2048);
    assert_eq!(group["totalWastedSpace"], 2048);
    assert!(group.get("selectedTrueCopy").is_none());

    let file = &group["files"][0];
    for field in [
        "id",
        "name",
        "path",
        "size",
        "hash",
        "lastModified",
        "webUrl",
        "siteId",
        "driveId",
    ] {
        assert!(file.get(field).is_some(), "missing file field {field}");
    }
}

#[test]
fn test_failed_report_carries_message() {
    let mut report = ScanReport::new("https://contoso.sharepoint.com/sites/gone");
    report.fail("Site not found");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "Failed");
    assert_eq!(json["errorMessage"], "Site not found");
    assert_eq!(report.status, ScanStatus::Failed);
}

#[test]
fn test_replacement_request_parsing() {
    let body = r#"{
        "scanId": "abc",
        "selections": [
            { "hash": "X", "trueCopyFileId": "a" },
            { "hash": "Y", "hashAlgorithm": "sha1", "trueCopyFileId": "c" }
        ]
    }"#;
    let request: ReplacementRequest = serde_json::from_str(body).unwrap();
    assert_eq!(request.scan_id, "abc");
    assert_eq!(request.selections.len(), 2);
    assert_eq!(request.selections[0].hash_algorithm, None);
    assert_eq!(request.selections[1].hash_algorithm, Some(HashAlgorithm::Sha1));

    let empty: ReplacementRequest = serde_json::from_str("{}").unwrap();
    assert!(empty.scan_id.is_empty());
    assert!(empty.selections.is_empty());
}
