//! End-to-end control-loop scenarios: scripted camera + detector driving the
//! bridge, and a live TCP actuator double for the dispatch failure paths.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use sorter_bridge::{
    BoundingBox, Bridge, BridgeState, Detection, Detector, DispatchError, DispatchGate,
    Dispatcher, Frame, FrameSource, HttpDispatcher, SignalTable,
};

// ----------------------------------------------------------------------------
// Scripted collaborators
// ----------------------------------------------------------------------------

struct ScriptedSource {
    frames: VecDeque<Frame>,
    released: bool,
}

impl ScriptedSource {
    fn with_frames(count: u64) -> Self {
        let frames = (1..=count)
            .map(|index| Frame::new(vec![0u8; 12], 2, 2, index))
            .collect();
        Self {
            frames,
            released: false,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    fn release(&mut self) {
        self.released = true;
    }
}

struct ScriptedDetector {
    script: VecDeque<Vec<Detection>>,
    labels: Vec<String>,
}

impl ScriptedDetector {
    fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
            labels: vec!["bio".to_string(), "other".to_string()],
        }
    }
}

impl Detector for ScriptedDetector {
    fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[derive(Clone, Default)]
struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingDispatcher {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&mut self, signal: &str) -> Result<(), DispatchError> {
        self.sent.lock().unwrap().push(signal.to_string());
        Ok(())
    }
}

fn detection(label: &str, confidence: f32) -> Detection {
    Detection {
        label: label.to_string(),
        confidence,
        bbox: BoundingBox {
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
        },
    }
}

// ----------------------------------------------------------------------------
// Actuator double
// ----------------------------------------------------------------------------

fn spawn_actuator(status_line: &'static str, responses: usize) -> (String, mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind actuator double");
    let addr = listener.local_addr().expect("actuator addr");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for _ in 0..responses {
            let Ok((mut stream, _)) = listener.accept() else {
                break;
            };
            let request = read_http_request(&mut stream);
            let _ = tx.send(request);
            let response = format!("{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            let _ = stream.write_all(response.as_bytes());
        }
    });
    (format!("http://{}/sort", addr), rx)
}

fn read_http_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(1) => buf.push(byte[0]),
            _ => return buf,
        }
    }
    let headers = String::from_utf8_lossy(&buf).to_string();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    let _ = stream.read_exact(&mut body);
    buf.extend_from_slice(&body);
    buf
}

// ----------------------------------------------------------------------------
// Loop behavior
// ----------------------------------------------------------------------------

#[test]
fn loop_stops_on_source_exhaustion_and_releases_it() -> Result<()> {
    let mut source = ScriptedSource::with_frames(3);
    let mut detector = ScriptedDetector::new(vec![vec![detection("bio", 0.9)]]);
    let recorder = RecordingDispatcher::default();

    let mut bridge = Bridge::new(
        SignalTable::defaults(),
        DispatchGate::new(Duration::from_millis(500)),
        Box::new(recorder.clone()),
    );
    bridge.run(&mut source, &mut detector, &AtomicBool::new(false))?;

    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert_eq!(bridge.counters().frames, 3);
    assert_eq!(recorder.sent(), vec!["bio"]);
    assert!(source.released, "source must be released on shutdown");
    Ok(())
}

#[test]
fn identical_detections_within_one_slot_dispatch_once() -> Result<()> {
    // Four consecutive frames all seeing the same object; one slot only.
    let script = (0..4).map(|_| vec![detection("bio", 0.9)]).collect();
    let mut source = ScriptedSource::with_frames(4);
    let mut detector = ScriptedDetector::new(script);
    let recorder = RecordingDispatcher::default();

    let mut bridge = Bridge::new(
        SignalTable::defaults(),
        DispatchGate::new(Duration::from_secs(10)),
        Box::new(recorder.clone()),
    );
    bridge.run(&mut source, &mut detector, &AtomicBool::new(false))?;

    assert_eq!(recorder.sent(), vec!["bio"]);
    assert_eq!(bridge.counters().dispatched, 1);
    assert_eq!(bridge.counters().throttled, 3);
    Ok(())
}

#[test]
fn frame_scenario_distinguishes_denied_suppressed_and_unmapped() -> Result<()> {
    let table = SignalTable::new([
        ("bio".to_string(), "bio".to_string()),
        ("other".to_string(), String::new()),
    ])?;
    let recorder = RecordingDispatcher::default();
    let mut bridge = Bridge::new(
        table,
        DispatchGate::new(Duration::from_millis(500)),
        Box::new(recorder.clone()),
    );

    let t0 = Instant::now();

    // t=0.0: bio dispatches and claims the slot until t=0.5.
    bridge.process_detections(&[detection("bio", 0.9)], t0);
    // t=0.2: bio again, denied by the gate.
    bridge.process_detections(&[detection("bio", 0.9)], t0 + Duration::from_millis(200));
    // t=0.6: "other" maps to the empty signal: suppressed, not denied.
    bridge.process_detections(&[detection("other", 0.9)], t0 + Duration::from_millis(600));
    // t=0.7: unknown label: skipped with a warning, nothing dispatched.
    bridge.process_detections(&[detection("unknown_label", 0.9)], t0 + Duration::from_millis(700));

    assert_eq!(recorder.sent(), vec!["bio"]);
    let counters = bridge.counters();
    assert_eq!(counters.dispatched, 1);
    assert_eq!(counters.throttled, 1);
    assert_eq!(counters.suppressed, 1);
    assert_eq!(counters.unmapped, 1);

    // The suppressed "other" left the slot free: bio at t=0.8 dispatches.
    bridge.process_detections(&[detection("bio", 0.9)], t0 + Duration::from_millis(800));
    assert_eq!(recorder.sent(), vec!["bio", "bio"]);
    Ok(())
}

// ----------------------------------------------------------------------------
// Dispatch failure containment
// ----------------------------------------------------------------------------

#[test]
fn actuator_rejection_does_not_stop_the_loop() -> Result<()> {
    let (endpoint, _requests) = spawn_actuator("HTTP/1.1 500 Internal Server Error", 2);
    let dispatcher = HttpDispatcher::new(&endpoint, None, Duration::from_secs(1));

    let script = vec![
        vec![detection("bio", 0.9)],
        Vec::new(),
        vec![detection("paper", 0.9)],
    ];
    let mut source = ScriptedSource::with_frames(3);
    let mut detector = ScriptedDetector::new(script);

    let mut bridge = Bridge::new(
        SignalTable::defaults(),
        DispatchGate::new(Duration::ZERO),
        Box::new(dispatcher),
    );
    bridge.run(&mut source, &mut detector, &AtomicBool::new(false))?;

    // Both dispatch attempts failed with HTTP 500, yet all frames were seen.
    assert_eq!(bridge.counters().frames, 3);
    assert_eq!(bridge.counters().dispatch_failures, 2);
    assert_eq!(bridge.counters().dispatched, 0);
    assert_eq!(bridge.state(), BridgeState::Stopped);
    Ok(())
}

#[test]
fn refused_connection_is_a_contained_transport_failure() -> Result<()> {
    // Bind, learn the port, then drop the listener so connections are refused.
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let endpoint = format!("http://{}/sort", listener.local_addr()?);
    drop(listener);

    let mut dispatcher = HttpDispatcher::new(&endpoint, None, Duration::from_secs(1));
    let err = dispatcher.dispatch("bio").expect_err("dispatch must fail");
    assert!(matches!(err, DispatchError::Transport(_)), "got {err:?}");

    // The same failure inside the loop leaves it running for the next frame.
    let mut source = ScriptedSource::with_frames(2);
    let mut detector = ScriptedDetector::new(vec![vec![detection("bio", 0.9)]]);
    let mut bridge = Bridge::new(
        SignalTable::defaults(),
        DispatchGate::new(Duration::ZERO),
        Box::new(HttpDispatcher::new(&endpoint, None, Duration::from_secs(1))),
    );
    bridge.run(&mut source, &mut detector, &AtomicBool::new(false))?;

    assert_eq!(bridge.counters().frames, 2);
    assert_eq!(bridge.counters().dispatch_failures, 1);
    Ok(())
}

// ----------------------------------------------------------------------------
// Wire protocol
// ----------------------------------------------------------------------------

#[test]
fn dispatch_sends_the_actuator_contract() -> Result<()> {
    let (endpoint, requests) = spawn_actuator("HTTP/1.1 200 OK", 1);
    let mut dispatcher =
        HttpDispatcher::new(&endpoint, Some("12345".to_string()), Duration::from_secs(1));

    dispatcher.dispatch("paper")?;

    let request = requests
        .recv_timeout(Duration::from_secs(2))
        .expect("actuator double saw the request");
    let request = String::from_utf8_lossy(&request).to_lowercase();

    assert!(request.starts_with("post /sort http/1.1"), "{request}");
    assert!(request.contains("x-request-id: 12345"), "{request}");
    assert!(request.contains("content-type: application/json"), "{request}");
    let body = r#"{"data":{"grupo":"paper"}}"#;
    assert!(request.contains("content-length: 26"), "{request}");
    assert!(request.ends_with(body), "{request}");
    Ok(())
}
