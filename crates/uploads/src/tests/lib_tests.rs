use super::*;

fn parquet(kind: GenomicKind, name: &str, len: usize) -> UploadedFile {
    UploadedFile::new(kind, name, vec![7u8; len], &UploadPolicy::default()).expect("valid upload")
}

#[test]
fn formats_sizes_like_the_upload_cards() {
    assert_eq!(format_file_size(0), "0 Bytes");
    assert_eq!(format_file_size(512), "512 Bytes");
    assert_eq!(format_file_size(1536), "1.5 KB");
    assert_eq!(format_file_size(1024 * 1024), "1 MB");
    assert_eq!(format_file_size(MAX_UPLOAD_BYTES), "100 MB");
    assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5 GB");
}

#[test]
fn estimates_one_record_per_kib() {
    assert_eq!(estimate_records(0), 0);
    assert_eq!(estimate_records(1023), 0);
    assert_eq!(estimate_records(4096), 4);
}

#[test]
fn rejects_wrong_extension_and_oversized_files() {
    let policy = UploadPolicy::default();
    let err = validate("methylation.csv", 10, &policy).expect_err("wrong extension");
    assert!(matches!(err, UploadError::InvalidFileType { .. }));
    assert_eq!(err.notice().title, "Invalid file type");

    let err = validate("methylation.parquet", MAX_UPLOAD_BYTES + 1, &policy)
        .expect_err("too large");
    assert!(matches!(err, UploadError::FileTooLarge { .. }));
    assert_eq!(err.notice().description, "Please upload files smaller than 100MB");

    validate("METHYLATION.PARQUET", MAX_UPLOAD_BYTES, &policy).expect("boundary accepted");
}

#[test]
fn encodes_contents_as_data_url_on_request() {
    let file = UploadedFile::new(
        GenomicKind::Rna,
        "rna.parquet",
        b"PAR1".to_vec(),
        &UploadPolicy::default(),
    )
    .expect("upload");
    assert_eq!(file.data_url(), "data:application/octet-stream;base64,UEFSMQ==");
    assert_eq!(&file.shared_bytes()[..], b"PAR1");
}

#[test]
fn same_kind_upload_replaces_in_place() {
    let mut set = UploadSet::new();
    set.upsert(parquet(GenomicKind::Dna, "dna-v1.parquet", 10));
    set.upsert(parquet(GenomicKind::Rna, "rna.parquet", 10));

    let replaced = set.upsert(parquet(GenomicKind::Dna, "dna-v2.parquet", 2048));
    assert_eq!(replaced.map(|f| f.filename().to_string()).as_deref(), Some("dna-v1.parquet"));
    assert_eq!(set.len(), 2);
    assert_eq!(set.files()[0].filename(), "dna-v2.parquet");
    assert_eq!(set.files()[0].records(), 2);
}

#[test]
fn never_holds_more_than_three_files() {
    let mut set = UploadSet::new();
    for round in 0..3 {
        for kind in GenomicKind::ALL {
            set.upsert(parquet(kind, &format!("{kind}-{round}.parquet"), 16));
            assert!(set.len() <= REQUIRED_UPLOADS);
        }
    }
    assert!(set.is_complete());
    assert!(set.progress().ready);
}

#[test]
fn removal_out_of_range_leaves_state_untouched() {
    let mut set = UploadSet::new();
    set.upsert(parquet(GenomicKind::Mirna, "mirna.parquet", 16));

    let err = set.remove(3).expect_err("missing index");
    assert!(matches!(err, UploadError::IndexOutOfRange { index: 3, len: 1 }));
    assert_eq!(set.len(), 1);
}

#[test]
fn subscribers_see_post_removal_collection() {
    let mut set = UploadSet::new();
    let mut changes = set.subscribe();
    set.upsert(parquet(GenomicKind::Dna, "dna.parquet", 16));
    set.upsert(parquet(GenomicKind::Rna, "rna.parquet", 16));
    assert_eq!(changes.borrow_and_update().len(), 2);

    let removed = set.remove(0).expect("remove");
    assert_eq!(removed.kind(), GenomicKind::Dna);

    let current = changes.borrow_and_update().clone();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].kind, GenomicKind::Rna);
    assert_eq!(current[0].index, 0);
}

#[test]
fn upload_notice_names_the_kind() {
    assert_eq!(
        uploaded_notice(GenomicKind::Mirna).description,
        "MIRNA file has been uploaded successfully"
    );
}

#[tokio::test]
async fn reads_upload_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("expression.parquet");
    std::fs::write(&path, vec![1u8; 3000]).expect("write");

    let file = UploadedFile::read(GenomicKind::Rna, &path, &UploadPolicy::default())
        .await
        .expect("read");
    assert_eq!(file.filename(), "expression.parquet");
    assert_eq!(file.size(), "2.93 KB");
    assert_eq!(file.records(), 2);
}

#[tokio::test]
async fn disk_read_rejects_before_loading_contents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("expression.parquet");
    std::fs::write(&path, vec![1u8; 64]).expect("write");

    let policy = UploadPolicy { max_bytes: 32 };
    let err = UploadedFile::read(GenomicKind::Rna, &path, &policy)
        .await
        .expect_err("too large");
    assert!(matches!(err, UploadError::FileTooLarge { size_bytes: 64, .. }));

    let missing = UploadedFile::read(GenomicKind::Rna, dir.path().join("gone.parquet"), &policy)
        .await
        .expect_err("missing");
    assert!(matches!(missing, UploadError::Read { .. }));
}
