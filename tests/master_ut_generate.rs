use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_recordbookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn recordbookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn generate_master_ut_writes_sheet_and_skips_rerun() {
    let workspace = temp_dir("recordbook-generate");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.ticketUpdate",
        json!({ "academicYear": "2023-24", "semester": 1 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.upsert",
        json!({ "year": 3, "classCode": "TE09" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "batches.upsert",
        json!({
            "year": 3,
            "classCode": "TE09",
            "batchCode": "K9",
            "theorySubjects": [
                { "title": "DSA", "teacher": "abc" },
                { "title": "CN", "teacher": "xyz" },
            ],
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.upsertMany",
        json!({
            "year": 3,
            "classCode": "TE09",
            "students": [
                { "rollNo": "33167", "name": "amy" },
                { "rollNo": "33168", "name": "bob" },
            ],
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "records.updateUnitTests",
        json!({
            "rollNo": "33167",
            "entries": [
                { "subject": "DSA", "ut1": 25, "ut2": 18 },
                { "subject": "CN", "ut1": 9 },
            ],
        }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "gen1",
        "reports.generateMasterUt",
        json!({ "years": [3] }),
    );
    let entries = first["manifest"]["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["sheetTitle"], "TE 09 SEM-1 2023-24");
    assert_eq!(entries[0]["created"], true);

    // A second run must leave the existing sheet untouched.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "gen2",
        "reports.generateMasterUt",
        json!({ "years": [3] }),
    );
    let entries = second["manifest"]["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["created"], false);

    // The rendered document lives under the workspace.
    let doc_path = workspace.join("spreadsheets").join("master.json");
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&doc_path).expect("read spreadsheet doc"))
            .expect("parse spreadsheet doc");
    let sheets = doc["sheets"].as_array().expect("sheets");
    assert_eq!(sheets.len(), 1);
    assert_eq!(sheets[0]["title"], "TE 09 SEM-1 2023-24");

    let cells = &sheets[0]["cells"];
    // Banner carries the default institution string.
    assert_eq!(
        cells["r0c0"],
        "PUNE INSTITUTE OF COMPUTER TECHNOLOGY, PUNE - 411043"
    );
    assert_eq!(cells["r4c0"], "UNIT TEST I REPORT");
    // First data row: rolls sorted ascending, marks in both halves.
    // half_width = 2 + 2 subjects + 1 = 5.
    assert_eq!(cells["r7c0"], "33167");
    assert_eq!(cells["r7c1"], "AMY");
    assert_eq!(cells["r7c2"], 25);
    assert_eq!(cells["r7c3"], 9);
    assert_eq!(cells["r7c4"], 34); // UT1 total
    assert_eq!(cells["r7c7"], 18); // UT2 DSA
    assert_eq!(cells["r7c10"], 52); // grand total
    // round(20 * 52 / 120) = 9
    assert_eq!(cells["r7c11"], 9);
    // Second student has no marks at all; totals are zero, cells blank.
    assert_eq!(cells["r8c0"], "33168");
    assert_eq!(cells["r8c2"], "");
    assert_eq!(cells["r8c4"], 0);

    let _ = child.kill();
}
