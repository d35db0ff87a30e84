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

fn seed_class(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    theory_subjects: serde_json::Value,
) {
    let _ = request_ok(
        stdin,
        reader,
        "ticket",
        "setup.ticketUpdate",
        json!({ "academicYear": "2023-24", "semester": 1 }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "class",
        "classes.upsert",
        json!({ "year": 3, "classCode": "TE09" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "batch",
        "batches.upsert",
        json!({
            "year": 3,
            "classCode": "TE09",
            "batchCode": "K9",
            "theorySubjects": theory_subjects,
        }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "students",
        "students.upsertMany",
        json!({
            "year": 3,
            "classCode": "TE09",
            "students": [
                { "rollNo": "33170", "name": "zoe" },
                { "rollNo": "33167", "name": "amy" },
                { "rollNo": "33168", "name": "bob" },
            ],
        }),
    );
}

#[test]
fn master_ut_model_aggregates_class_stats() {
    let workspace = temp_dir("recordbook-model");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_class(
        &mut stdin,
        &mut reader,
        json!([{ "title": "DSA", "teacher": "abcdef" }]),
    );

    // One pass, one fail, one absent in UT1.
    for (i, (roll, entry)) in [
        ("33167", json!({ "subject": "DSA", "ut1": 10 })),
        ("33168", json!({ "subject": "DSA", "ut1Absent": true })),
        ("33170", json!({ "subject": "DSA", "ut1": 25 })),
    ]
    .into_iter()
    .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("ut{}", i),
            "records.updateUnitTests",
            json!({ "rollNo": roll, "entries": [entry] }),
        );
    }

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "model",
        "reports.masterUtModel",
        json!({ "year": 3, "classCode": "TE09" }),
    );
    let model = result.get("model").expect("model");

    assert_eq!(model["sheetTitle"], "TE 09 SEM-1 2023-24");
    assert_eq!(model["classLabel"], "TE 09");
    assert_eq!(model["rollNos"], json!(["33167", "33168", "33170"]));
    assert_eq!(model["names"], json!(["AMY", "BOB", "ZOE"]));
    assert_eq!(model["subjects"][0]["teacher"], "ABC");
    // roll + name + one subject + total
    assert_eq!(model["halfWidth"], 4);
    assert_eq!(model["slotCount"], 1);
    assert_eq!(model["marksOutOf"], 30);

    let ut1 = &model["stats"]["subjects"][0]["ut1"];
    assert_eq!(ut1["absent"], 1);
    assert_eq!(ut1["appeared"], 2);
    assert_eq!(ut1["passed"], 1);
    assert_eq!(ut1["failed"], 1);
    assert_eq!(ut1["total"], 3);
    assert_eq!(ut1["average"], 50.0);
    assert_eq!(
        model["stats"]["subjects"][0]["ut1Histogram"]["buckets"],
        json!([0, 1, 0, 0, 1])
    );
    // Nobody has UT2 marks yet.
    assert_eq!(model["stats"]["subjects"][0]["ut2"]["appeared"], 0);
    assert_eq!(model["stats"]["ut2GrandAverage"], serde_json::Value::Null);

    let _ = child.kill();
}

#[test]
fn master_ut_model_groups_electives_into_one_slot() {
    let workspace = temp_dir("recordbook-model-elective");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_class(
        &mut stdin,
        &mut reader,
        json!([
            { "title": "ML", "teacher": "aaa", "electiveGroup": "Elective-I" },
            { "title": "DSA", "teacher": "bbb" },
            { "title": "IoT", "teacher": "ccc", "electiveGroup": "Elective-I" },
        ]),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "model",
        "reports.masterUtModel",
        json!({ "year": 3, "classCode": "TE09" }),
    );
    let model = result.get("model").expect("model");

    // Normalized order: regular subjects first, elective members adjacent.
    assert_eq!(model["subjects"][0]["title"], "DSA");
    assert_eq!(model["subjects"][1]["title"], "ML");
    assert_eq!(model["subjects"][2]["title"], "IoT");
    // Three subject columns, but only two assessment slots.
    assert_eq!(model["halfWidth"], 6);
    assert_eq!(model["slotCount"], 2);
    assert_eq!(model["marksOutOf"], 60);

    let _ = child.kill();
}
