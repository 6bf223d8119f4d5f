//! spec.md §8 scenario 4: CPAN's author comes from `META.json`/`META.yml`
//! inside the unpacked archive, not from the registry index, so this
//! exercises the fetch -> unpack -> hash -> build_release path for real
//! rather than just the adapter's own parsing unit tests.

mod common;

use pkgvault_loader::config::LoaderConfig;
use pkgvault_loader::fetch::{Fetcher, RetryPolicy, Scripted, ScriptedTransport};
use pkgvault_loader::model::{VisitStatus, VisitType};
use pkgvault_loader::orchestrator::{CancelToken, Orchestrator};
use pkgvault_loader::store::InMemoryStore;
use std::sync::Arc;
use url::Url;

#[tokio::test]
async fn reads_author_out_of_the_unpacked_archive() {
    let archive = common::build_tar_bz2(&[(
        "Internals-CountObjects-0.06/META.json",
        br#"{"author": ["Jane Doe <jane@example.test>"]}"#,
    )]);
    let download_url = "https://cpan.example.test/authors/id/J/JD/Internals-CountObjects-0.06.tar.bz2";

    let index = serde_json::json!({
        "distribution": "Internals-CountObjects",
        "releases": {
            "0.06": {
                "archive": "Internals-CountObjects-0.06.tar.bz2",
                "download_url": download_url,
            },
        },
    });
    let index_bytes = serde_json::to_vec(&index).unwrap();
    let index_url = Url::parse("https://cpan.example.test/release/Internals-CountObjects").unwrap();

    let transport = ScriptedTransport::new();
    // get_versions + get_default_version (itself calls get_versions again)
    // + get_package_info("0.06")
    for _ in 0..3 {
        transport.push(index_url.as_str(), Scripted::Ok(index_bytes.clone()));
    }
    transport.push(download_url, Scripted::Ok(archive));

    let fetcher = Fetcher::new(
        transport,
        RetryPolicy::default(),
        tempfile::tempdir().unwrap().path().to_path_buf(),
    );
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        store,
        Arc::new(fetcher),
        LoaderConfig::default(),
        tempfile::tempdir().unwrap().path().to_path_buf(),
    );

    let result = orchestrator
        .load(index_url, VisitType::Cpan, 1, &CancelToken::new())
        .await;

    assert_eq!(result.status, VisitStatus::Full);
    assert!(result.failures.is_empty(), "unexpected failures: {:?}", result.failures);
    assert_eq!(result.stats.branches_succeeded, 1);
}
