use std::collections::BTreeSet;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use std::time::Duration;

use build_triage::{
    CategorizeConfig, Categorizer, FetchConfig, Fetcher, RecordStore, ScriptTransport,
    TriageError, fetch_failures,
};

const RESPONSE: &str = "api\t101\tjava.lang.NullPointerException at com.acme.UserService.load(UserService.java:42)\turl=https://ci/job/api/101/\n\
api\t102\tjava.lang.NullPointerException at com.acme.UserService.load(UserService.java:57)\n\
api\t\tbuild number went missing\n\
{\"job\":\"db\",\"build\":7,\"text\":\"java.net.SocketTimeoutException: Read timed out\",\"timestamp\":\"2025-02-01T09:30:00Z\"}\n";

struct CannedServer {
    body: String,
}

impl ScriptTransport for CannedServer {
    fn endpoint(&self) -> &str {
        "http://ci.test/scriptText"
    }

    fn run_script(&self, script: &str) -> Result<String, TriageError> {
        assert!(script.contains("failed builds"));
        Ok(self.body.clone())
    }

    fn fetch_text(&self, url: &str) -> Result<String, TriageError> {
        Err(TriageError::ConsoleUnavailable {
            url: url.to_string(),
            reason: "not served".into(),
        })
    }
}

fn write_script(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("find-failed.groovy");
    fs::write(&path, "// list failed builds\nprintln 'x'\n").unwrap();
    path
}

fn record_ids(dir: &Path) -> BTreeSet<String> {
    RecordStore::new(dir)
        .load_all()
        .unwrap()
        .records
        .into_iter()
        .map(|record| record.id)
        .collect()
}

#[test]
fn entry_without_build_number_is_skipped_and_others_are_written() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("records");
    let config = FetchConfig::new("http://ci.test", &out, write_script(temp.path()));
    let fetcher = Fetcher::new(
        config,
        CannedServer {
            body: RESPONSE.to_string(),
        },
    );

    let summary = fetcher.run().unwrap();
    assert_eq!(summary.entries, 4);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.malformed, 1);
    assert_eq!(
        record_ids(&out),
        BTreeSet::from(["api#101".to_string(), "api#102".to_string(), "db#7".to_string()])
    );

    let load = RecordStore::new(&out).load_all().unwrap();
    let first = &load.records[0];
    assert_eq!(first.job_name, "api");
    assert_eq!(first.build_number, 101);
    assert_eq!(
        first.raw_metadata.get("url").map(String::as_str),
        Some("https://ci/job/api/101/")
    );
    let db = &load.records[2];
    assert_eq!(db.timestamp.to_rfc3339(), "2025-02-01T09:30:00+00:00");
}

#[test]
fn refetching_unchanged_state_rewrites_identical_files() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("records");
    let script = write_script(temp.path());
    let fetch = || {
        Fetcher::new(
            FetchConfig::new("http://ci.test", &out, &script),
            CannedServer {
                body: RESPONSE.to_string(),
            },
        )
        .run()
        .unwrap()
    };

    fetch();
    let snapshot: Vec<(String, Vec<u8>)> = fs::read_dir(&out)
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            (path.display().to_string(), fs::read(&path).unwrap())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    // Timestamp-less entries must keep their first fetch time.
    thread::sleep(Duration::from_millis(20));
    fetch();
    let again: Vec<(String, Vec<u8>)> = fs::read_dir(&out)
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            (path.display().to_string(), fs::read(&path).unwrap())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    assert_eq!(snapshot, again);
}

#[test]
fn stale_records_survive_a_refetch() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("records");
    let script = write_script(temp.path());
    Fetcher::new(
        FetchConfig::new("http://ci.test", &out, &script),
        CannedServer {
            body: RESPONSE.to_string(),
        },
    )
    .run()
    .unwrap();
    Fetcher::new(
        FetchConfig::new("http://ci.test", &out, &script),
        CannedServer {
            body: "db\t8\tDisk full\n".to_string(),
        },
    )
    .run()
    .unwrap();
    assert_eq!(record_ids(&out).len(), 4);
}

#[test]
fn missing_script_is_fatal_before_contacting_the_server() {
    let temp = tempfile::tempdir().unwrap();
    let config = FetchConfig::new(
        "http://ci.test",
        temp.path().join("records"),
        temp.path().join("absent.groovy"),
    );
    let err = Fetcher::new(
        config,
        CannedServer {
            body: String::new(),
        },
    )
    .run()
    .unwrap_err();
    assert!(matches!(err, TriageError::ScriptUnavailable { .. }));
}

#[test]
fn unreachable_server_aborts_with_endpoint_and_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let out = temp.path().join("records");
    let config = FetchConfig::new(format!("http://{addr}"), &out, write_script(temp.path()))
        .with_timeout(Duration::from_secs(5));
    let err = fetch_failures(config).unwrap_err();
    assert!(matches!(err, TriageError::ServerUnreachable { .. }));
    assert!(err.to_string().contains(&format!("http://{addr}/scriptText")));
    assert!(record_ids(&out).is_empty());
}

#[test]
fn fetch_over_http_then_categorize() {
    let temp = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = stream.read(&mut chunk).unwrap();
            if read == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&buf).to_ascii_lowercase();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let body_len = text[..head_end]
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + body_len {
                    break;
                }
            }
        }
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            RESPONSE.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(RESPONSE.as_bytes()).unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    });

    let out = temp.path().join("records");
    let config = FetchConfig::new(format!("http://{addr}/"), &out, write_script(temp.path()));
    let summary = fetch_failures(config).unwrap();
    let request = server.join().unwrap();
    assert!(request.starts_with("POST /scriptText"));
    assert!(request.contains("script="));
    assert_eq!(summary.written, 3);

    let report = Categorizer::new(CategorizeConfig::new(&out)).run().unwrap();
    assert_eq!(report.total_records, 3);
    assert_eq!(report.categories.len(), 2);
    assert_eq!(report.categories[0].members, vec!["api#101", "api#102"]);
    assert_eq!(report.categories[1].members, vec!["db#7"]);
    assert_eq!(
        report.member_urls.get("api#101").map(String::as_str),
        Some("https://ci/job/api/101/")
    );
}
