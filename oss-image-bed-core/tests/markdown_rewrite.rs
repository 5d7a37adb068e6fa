use std::fs::{create_dir_all, read_to_string, write};
use std::path::Path;

use tempfile::tempdir;

use oss_image_bed_core::config::{MarkdownConfig, StoreConfig, UploadConfig};
use oss_image_bed_core::contract::{MockBucketClient, StoreError};
use oss_image_bed_core::markdown::{MarkdownRewriter, RewriteStatus};
use oss_image_bed_core::naming::NamingRule;
use oss_image_bed_core::uploader::ImageUploader;

fn uploader(client: MockBucketClient) -> ImageUploader<MockBucketClient> {
    let store = StoreConfig {
        endpoint: "endpoint".to_string(),
        bucket_name: "bkt".to_string(),
        custom_domain: String::new(),
    };
    let upload = UploadConfig {
        naming_rule: NamingRule::Original,
        retry_times: 1,
        ..UploadConfig::default()
    };
    ImageUploader::new(client, store, upload)
}

fn ok_client(times: usize) -> MockBucketClient {
    let mut client = MockBucketClient::new();
    client.expect_put().times(times).returning(|_, _| Ok(()));
    client
}

fn write_doc(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn local_reference_is_rewritten_and_original_backed_up() {
    let tmp = tempdir().unwrap();
    write(tmp.path().join("x.png"), b"png bytes").unwrap();
    let original = "![a](./x.png) ![b](http://ex.com/y.png)";
    let doc = write_doc(tmp.path(), "doc.md", original);

    let up = uploader(ok_client(1));
    let rewriter = MarkdownRewriter::new(&up, MarkdownConfig::default()).unwrap();
    let report = rewriter.process_file(&doc).await;

    assert_eq!(report.status, RewriteStatus::Rewritten);
    assert_eq!((report.processed, report.failed), (1, 0));
    assert_eq!(
        read_to_string(&doc).unwrap(),
        "![a](https://bkt.endpoint/x.png) ![b](http://ex.com/y.png)"
    );

    let backup = report.backup_path.expect("backup written");
    assert!(backup.to_string_lossy().ends_with("doc.md.bak"));
    assert_eq!(read_to_string(backup).unwrap(), original);
}

#[tokio::test]
async fn backup_can_be_disabled() {
    let tmp = tempdir().unwrap();
    write(tmp.path().join("x.png"), b"png bytes").unwrap();
    let doc = write_doc(tmp.path(), "doc.md", "![](x.png)");

    let up = uploader(ok_client(1));
    let config = MarkdownConfig {
        backup_original: false,
        ..MarkdownConfig::default()
    };
    let rewriter = MarkdownRewriter::new(&up, config).unwrap();
    let report = rewriter.process_file(&doc).await;

    assert!(report.is_success());
    assert!(report.backup_path.is_none());
    assert!(!tmp.path().join("doc.md.bak").exists());
    // Empty alt falls back to the configured alt text.
    assert_eq!(read_to_string(&doc).unwrap(), "![image](https://bkt.endpoint/x.png)");
}

#[tokio::test]
async fn document_untouched_when_every_upload_fails() {
    let tmp = tempdir().unwrap();
    write(tmp.path().join("x.png"), b"png bytes").unwrap();
    let original = "intro\n![a](x.png)\n";
    let doc = write_doc(tmp.path(), "doc.md", original);

    let mut client = MockBucketClient::new();
    client
        .expect_put()
        .returning(|_, _| Err(StoreError::Request("denied".into())));
    let up = uploader(client);
    let rewriter = MarkdownRewriter::new(&up, MarkdownConfig::default()).unwrap();
    let report = rewriter.process_file(&doc).await;

    assert_eq!(report.status, RewriteStatus::Failed);
    assert_eq!((report.processed, report.failed), (0, 1));
    assert_eq!(
        report.error_message.as_deref(),
        Some("no images uploaded successfully")
    );
    assert_eq!(read_to_string(&doc).unwrap(), original);
    assert!(!tmp.path().join("doc.md.bak").exists());
}

#[tokio::test]
async fn partial_failure_rewrites_only_successful_references() {
    let tmp = tempdir().unwrap();
    write(tmp.path().join("ok.png"), b"good").unwrap();
    write(tmp.path().join("bad.png"), b"bad").unwrap();
    let doc = write_doc(tmp.path(), "doc.md", "![ok](ok.png) ![bad](bad.png)");

    let mut client = MockBucketClient::new();
    client.expect_put().returning(|key, _| {
        if key == "bad.png" {
            Err(StoreError::Request("denied".into()))
        } else {
            Ok(())
        }
    });
    let up = uploader(client);
    let rewriter = MarkdownRewriter::new(&up, MarkdownConfig::default()).unwrap();
    let report = rewriter.process_file(&doc).await;

    assert_eq!(report.status, RewriteStatus::Rewritten);
    assert_eq!((report.processed, report.failed), (1, 1));
    assert_eq!(
        read_to_string(&doc).unwrap(),
        "![ok](https://bkt.endpoint/ok.png) ![bad](bad.png)"
    );
}

#[tokio::test]
async fn document_without_local_images_is_a_no_op() {
    let tmp = tempdir().unwrap();
    let original = "# Title\n![remote](https://cdn.example.com/a.png)\n![gone](missing.png)\n";
    let doc = write_doc(tmp.path(), "doc.md", original);

    let mut client = MockBucketClient::new();
    client.expect_put().never();
    let up = uploader(client);
    let rewriter = MarkdownRewriter::new(&up, MarkdownConfig::default()).unwrap();
    let report = rewriter.process_file(&doc).await;

    assert_eq!(report.status, RewriteStatus::NoLocalImages);
    assert!(report.is_success());
    assert_eq!(read_to_string(&doc).unwrap(), original);
    assert!(!tmp.path().join("doc.md.bak").exists());
}

#[tokio::test]
async fn non_markdown_and_missing_files_fail() {
    let tmp = tempdir().unwrap();
    let txt = write_doc(tmp.path(), "notes.txt", "![a](x.png)");

    let up = uploader(MockBucketClient::new());
    let rewriter = MarkdownRewriter::new(&up, MarkdownConfig::default()).unwrap();

    let report = rewriter.process_file(&txt).await;
    assert_eq!(report.status, RewriteStatus::Failed);
    assert!(report.error_message.unwrap().contains("not a Markdown file"));

    let report = rewriter.process_file(&tmp.path().join("nope.md")).await;
    assert_eq!(report.status, RewriteStatus::Failed);
    assert!(report.error_message.unwrap().contains("file not found"));
}

#[tokio::test]
async fn invalid_custom_pattern_is_rejected() {
    let up = uploader(MockBucketClient::new());
    let config = MarkdownConfig {
        local_image_pattern: Some("![(".to_string()),
        ..MarkdownConfig::default()
    };
    assert!(MarkdownRewriter::new(&up, config).is_err());
}

#[tokio::test]
async fn shared_image_across_documents_is_uploaded_once() {
    let tmp = tempdir().unwrap();
    let docs = tmp.path().join("docs");
    let nested = docs.join("nested");
    create_dir_all(&nested).unwrap();
    write(docs.join("logo.png"), b"logo").unwrap();
    write_doc(&docs, "a.md", "![logo](logo.png)");
    write_doc(&nested, "b.md", "![logo](../logo.png)");
    write_doc(&docs, "c.md", "plain text");
    // Only lower-case `.md` is enumerated in directory mode.
    write_doc(&docs, "d.markdown", "![logo](logo.png)");
    write_doc(&docs, "E.MD", "![logo](logo.png)");

    let up = uploader(ok_client(1));
    let rewriter = MarkdownRewriter::new(&up, MarkdownConfig::default()).unwrap();
    let report = rewriter.process_directory(&docs).await.unwrap();

    assert_eq!(report.files.len(), 3);
    assert_eq!(report.total_processed, 2);
    assert_eq!(report.total_failed, 0);
    assert!(report.files.iter().all(|f| f.is_success()));
    assert_eq!(
        read_to_string(nested.join("b.md")).unwrap(),
        "![logo](https://bkt.endpoint/logo.png)"
    );
    assert_eq!(read_to_string(docs.join("d.markdown")).unwrap(), "![logo](logo.png)");
    assert_eq!(read_to_string(docs.join("E.MD")).unwrap(), "![logo](logo.png)");
}

#[tokio::test]
async fn single_markdown_extension_file_is_accepted() {
    let tmp = tempdir().unwrap();
    write(tmp.path().join("x.png"), b"png bytes").unwrap();
    let doc = write_doc(tmp.path(), "notes.Markdown", "![x](x.png)");

    let up = uploader(ok_client(1));
    let rewriter = MarkdownRewriter::new(&up, MarkdownConfig::default()).unwrap();
    let report = rewriter.process_file(&doc).await;

    assert_eq!(report.status, RewriteStatus::Rewritten);
}

#[tokio::test]
async fn failed_backup_leaves_document_untouched() {
    let tmp = tempdir().unwrap();
    write(tmp.path().join("x.png"), b"png bytes").unwrap();
    let original = "![a](x.png)\n";
    let doc = write_doc(tmp.path(), "doc.md", original);
    // A directory where the backup file should go makes the copy fail.
    create_dir_all(tmp.path().join("doc.md.bak")).unwrap();

    let up = uploader(ok_client(1));
    let rewriter = MarkdownRewriter::new(&up, MarkdownConfig::default()).unwrap();
    let report = rewriter.process_file(&doc).await;

    assert_eq!(report.status, RewriteStatus::Failed);
    assert!(report.backup_path.is_none());
    let message = report.error_message.expect("error message set");
    assert!(message.contains("failed to back up"), "got: {message}");
    assert_eq!(read_to_string(&doc).unwrap(), original);
}

#[tokio::test]
async fn repeated_reference_counts_every_occurrence() {
    let tmp = tempdir().unwrap();
    write(tmp.path().join("x.png"), b"png bytes").unwrap();
    let doc = write_doc(tmp.path(), "doc.md", "![a](x.png) and again ![a](x.png)");

    let up = uploader(ok_client(1));
    let rewriter = MarkdownRewriter::new(&up, MarkdownConfig::default()).unwrap();
    let report = rewriter.process_file(&doc).await;

    assert_eq!(report.status, RewriteStatus::Rewritten);
    assert_eq!((report.processed, report.failed), (2, 0));
    assert_eq!(
        read_to_string(&doc).unwrap(),
        "![a](https://bkt.endpoint/x.png) and again ![a](https://bkt.endpoint/x.png)"
    );
}

#[tokio::test]
async fn non_recursive_directory_skips_subfolders() {
    let tmp = tempdir().unwrap();
    let nested = tmp.path().join("nested");
    create_dir_all(&nested).unwrap();
    write_doc(tmp.path(), "top.md", "nothing here");
    write_doc(&nested, "deep.md", "nothing here either");

    let up = uploader(MockBucketClient::new());
    let config = MarkdownConfig {
        recursive: false,
        ..MarkdownConfig::default()
    };
    let rewriter = MarkdownRewriter::new(&up, config).unwrap();
    let report = rewriter.process_directory(tmp.path()).await.unwrap();
    assert_eq!(report.files.len(), 1);

    assert!(rewriter
        .process_directory(&tmp.path().join("absent"))
        .await
        .is_err());
}
