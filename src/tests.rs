//! Startup through to a finished sync, over the in-memory fakes.

use serde_json::Value;

use crate::{
    config::AgentConfig,
    pacer::CountingPacer,
    save::fixture::{date, RawMeasurement, SaveImage},
    sequencer::{self, mock::MockSystem},
    storage::{
        mock::{CallLog, MemFlash},
        SaveReader,
    },
    transport::{
        mock::{ClientHandle, MockNetwork},
        Accept, SessionOutcome, SyncServer, TransportState,
    },
};

const PATH: &str = "/title/00010000/5246504a/data/FitPlus0.dat";

fn weigh_in(day: u8, weight: u16, bmi: u16) -> RawMeasurement {
    RawMeasurement {
        date: date(2023, 5, day, 7, 45),
        weight,
        bmi,
        balance: 498,
    }
}

fn start(files: MemFlash, log: CallLog) -> (SyncServer<MockNetwork>, MockNetwork, sequencer::Bootstrap) {
    let cfg = AgentConfig::default();
    let (_, boot) = sequencer::run(MockSystem::new(log), SaveReader::new(files), &cfg).into_parts();

    let net = MockNetwork::default();
    let mut server = SyncServer::new(net.clone(), cfg.transport);
    server.start().unwrap();
    (server, net, boot)
}

fn connect(server: &mut SyncServer<MockNetwork>, net: &MockNetwork) -> ClientHandle {
    let client = net.connect();
    client.data(br#"{"action":"sync"}"#).data(br#"{"ack":true}"#);
    assert_eq!(server.poll_accept(), Ok(Accept::Accepted));
    client
}

#[test]
fn test_sync_one_profile_two_measurements() {
    let mut img = SaveImage::with_slots(1);
    img.profile(0, "Kai", 172, [0x19, 0x90, 0x02, 0x14])
        .measurement(0, 0, weigh_in(10, 725, 2451))
        .measurement(0, 1, weigh_in(12, 718, 2427));
    let log = CallLog::default();
    let files = MemFlash {
        log: log.clone(),
        ..MemFlash::with_file(PATH, img.bytes)
    };

    let (mut server, net, boot) = start(files, log);
    let client = connect(&mut server, &net);

    let outcome = server.serve(&boot.snapshot, &mut CountingPacer::default());
    assert!(matches!(outcome, SessionOutcome::Synced { acked: true, .. }));
    assert_eq!(server.state(), TransportState::Idle);
    assert!(client.closed());

    let doc: Value = serde_json::from_slice(&client.sent()).unwrap();
    assert_eq!(doc["version"], 2);
    let profiles = doc["profiles"].as_array().unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["name"], "Kai");
    assert_eq!(profiles[0]["dob"], "1990-02-14");

    let measurements = profiles[0]["measurements"].as_array().unwrap();
    assert_eq!(measurements.len(), 2);
    assert_eq!(measurements[0]["date"], "2023-05-10T07:45:00");
    assert_eq!(measurements[0]["weight_kg"], 72.5);
    assert_eq!(measurements[0]["bmi"], 24.51);
    assert_eq!(measurements[1]["date"], "2023-05-12T07:45:00");
    assert_eq!(measurements[1]["weight_kg"], 71.8);
    assert_eq!(measurements[1]["balance_percent"], 49.8);

    // the listener is still there for the next client
    let again = connect(&mut server, &net);
    server.serve(&boot.snapshot, &mut CountingPacer::default());
    assert_eq!(again.sent(), client.sent());
}

#[test]
fn test_missing_save_syncs_error_document() {
    let log = CallLog::default();
    let files = MemFlash {
        log: log.clone(),
        ..MemFlash::default()
    };

    let (mut server, net, boot) = start(files, log);
    let client = connect(&mut server, &net);
    server.serve(&boot.snapshot, &mut CountingPacer::default());

    let doc: Value = serde_json::from_slice(&client.sent()).unwrap();
    assert_eq!(doc["version"], 2);
    assert_eq!(doc["error"]["code"], -2);
    assert!(doc["error"]["message"].as_str().unwrap().starts_with("Save not found"));
    assert!(doc.get("profiles").is_none());
}
