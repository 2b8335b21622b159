//! Integration tests for the TC security pipeline and SDLS EP interpreter,
//! exercised end to end through `Engine::tc_apply`/`tc_process` rather than
//! against individual components.

use sdls_core::sdls_interpreter::{SG_KEY_MGMT, SG_SA_MGMT, SG_SEC_MC};
use sdls_core::{Engine, EngineConfig, EngineError, KeyState};
use sdls_crypto::{AesGcmProvider, CryptoProvider};
use sdls_proto::sdls_pdu::{CcsdsHeader, SdlsFrame, TlvPdu, SDLS_APP_ID};
use sdls_proto::tc::TcPrimaryHeader;
use sdls_proto::IV_SIZE;

const SCID: u16 = 0x0044;
/// SA1 is seeded Clear/Operational, bound to vcid 0 and 1; used as the
/// plaintext channel every EP command in this file rides in on.
const CLEAR_VCID: u8 = 0;

fn engine() -> Engine {
    Engine::init(EngineConfig::default()).expect("self-test must pass")
}

/// Wrap a `{sg, pid}` command payload in the CCSDS + TLV envelope the
/// interpreter expects, then secure it through the Clear-mode command SA
/// and hand the wire bytes back for `tc_process`.
fn build_command(engine: &mut Engine, vcid: u8, sg: u8, pid: u8, payload: Vec<u8>) -> Vec<u8> {
    let pdu = TlvPdu { pdu_type: 0, uf: 0, sg, pid, pdu_len: payload.len() as u16, data: payload };
    let frame = SdlsFrame { header: CcsdsHeader { app_id: SDLS_APP_ID, ..Default::default() }, pus_header: None, pdu };
    let plaintext = frame.encode();

    let header = TcPrimaryHeader { tfvn: 0, bypass: false, cc: false, scid: SCID, vcid, fl: 0, fsn: 0 };
    let mut raw = header.encode().to_vec();
    raw.extend_from_slice(&plaintext);
    engine.tc_apply(&raw).expect("command SA is Clear/Operational")
}

/// Run a command through apply+process and decode its reply TLV payload.
fn run_command(engine: &mut Engine, sg: u8, pid: u8, payload: Vec<u8>) -> Result<Vec<u8>, EngineError> {
    let wire = build_command(engine, CLEAR_VCID, sg, pid, payload);
    let reply = engine.tc_process(&wire)?;
    if reply.is_empty() {
        return Ok(Vec::new());
    }
    Ok(SdlsFrame::decode(&reply).expect("reply is a valid SDLS frame").pdu.data)
}

// ---- MC Ping ------------------------------------------------------------

#[test]
fn mc_ping_replies_with_bare_nine_byte_envelope() {
    let mut eng = engine();
    let wire = build_command(&mut eng, CLEAR_VCID, SG_SEC_MC, 0, Vec::new());
    let reply = eng.tc_process(&wire).unwrap();
    assert_eq!(reply.len(), 9);
}

// ---- FSR flags, invalid SPI ----------------------------------------------

#[test]
fn invalid_spi_sets_ispif_and_is_rejected() {
    let mut eng = engine();
    let header = TcPrimaryHeader { tfvn: 0, bypass: false, cc: false, scid: SCID, vcid: CLEAR_VCID, fl: 0, fsn: 0 };
    let mut raw = header.encode().to_vec();
    raw.extend_from_slice(b"unused");
    let wire = eng.tc_apply(&raw).unwrap();

    // Corrupt the SPI field (byte 5 of the TC frame: sh(1) then spi hi byte).
    let mut corrupted = wire.clone();
    corrupted[6] = 0xFF;
    corrupted[7] = 0xFF;

    let result = eng.tc_process(&corrupted);
    assert!(matches!(result, Err(EngineError::Policy(_))));
    assert!(eng.report.ispif);
}

// ---- SA state machine ------------------------------------------------------

#[test]
fn sa_start_without_keyed_state_is_rejected_and_leaves_sa_unchanged() {
    let mut eng = engine();
    // SPI 7 is a `None`-state slot (only 1..6 are seeded); sa_start requires Keyed.
    let payload = {
        let mut p = 7u16.to_be_bytes().to_vec();
        p.push(0); // num_gvcid = 0
        p
    };
    let result = run_command(&mut eng, SG_SA_MGMT, 6, payload);
    assert!(result.is_err());
}

// ---- key state monotonicity -------------------------------------------------

#[test]
fn activating_a_master_key_is_rejected_and_raises_af() {
    let mut eng = engine();
    let payload = 0u16.to_be_bytes().to_vec(); // kid 0 is a master key
    let _ = run_command(&mut eng, SG_KEY_MGMT, 1, payload); // Activate
    assert!(eng.report.af);
}

#[test]
fn session_key_inventory_reports_seeded_states() {
    let mut eng = engine();
    let mut payload = 128u16.to_be_bytes().to_vec();
    payload.extend_from_slice(&135u16.to_be_bytes());
    let reply = run_command(&mut eng, SG_KEY_MGMT, 5, payload).unwrap(); // Inventory
    let range = u16::from_be_bytes([reply[0], reply[1]]);
    assert_eq!(range, 7);
    // kid 132 was seeded PreActive by the default configuration.
    let entry_for_132 = reply[2..].chunks(3).find(|c| u16::from_be_bytes([c[0], c[1]]) == 132).unwrap();
    assert_eq!(entry_for_132[2], KeyState::PreActive.ordinal().unwrap());
}

// ---- OTAR atomicity --------------------------------------------------------

fn master_key_0() -> [u8; 32] {
    let mut k = [0u8; 32];
    for (i, byte) in k.iter_mut().enumerate() {
        *byte = (i % 16) as u8;
    }
    k
}

fn otar_payload(ekid: u16, ek: [u8; 32], mac_flip: bool) -> Vec<u8> {
    let iv = [0x5Au8; IV_SIZE];
    let mut blob = ekid.to_be_bytes().to_vec();
    blob.extend_from_slice(&ek);

    let provider = AesGcmProvider::new();
    let (ciphertext, mut tag) = provider.encrypt(&master_key_0(), &iv, &[], &blob).unwrap();
    if mac_flip {
        tag[0] ^= 0xFF;
    }

    let mut payload = 0u16.to_be_bytes().to_vec(); // mkid = 0
    payload.extend_from_slice(&iv);
    payload.extend_from_slice(&ciphertext);
    payload.extend_from_slice(&tag);
    payload
}

#[test]
fn otar_happy_path_installs_key_preactive() {
    let mut eng = engine();
    let new_key = [0x99u8; 32];
    let payload = otar_payload(133, new_key, false);
    run_command(&mut eng, SG_KEY_MGMT, 0, payload).unwrap();

    let mut inv_payload = 133u16.to_be_bytes().to_vec();
    inv_payload.extend_from_slice(&134u16.to_be_bytes());
    let reply = run_command(&mut eng, SG_KEY_MGMT, 5, inv_payload).unwrap();
    assert_eq!(reply[2..4], 133u16.to_be_bytes());
    assert_eq!(reply[4], KeyState::PreActive.ordinal().unwrap());
}

#[test]
fn otar_bad_mac_installs_nothing() {
    let mut eng = engine();
    // kid 134 was seeded Deactivated; record the pre-OTAR state via Inventory.
    let mut inv_payload = 134u16.to_be_bytes().to_vec();
    inv_payload.extend_from_slice(&135u16.to_be_bytes());
    let before = run_command(&mut eng, SG_KEY_MGMT, 5, inv_payload.clone()).unwrap();

    let payload = otar_payload(134, [0x11u8; 32], true);
    let result = run_command(&mut eng, SG_KEY_MGMT, 0, payload);
    assert!(result.is_err());
    assert!(eng.report.af);

    let after = run_command(&mut eng, SG_KEY_MGMT, 5, inv_payload).unwrap();
    assert_eq!(before, after, "a failing OTAR MAC must not install any key");
}

// ---- AEAD round-trip and anti-replay windowing ------------------------------

fn start_aead_sa_on_vcid(eng: &mut Engine, spi: u16, vcid: u8) {
    let mut payload = spi.to_be_bytes().to_vec();
    payload.push(1); // num_gvcid = 1
    payload.push(0); // tfvn
    payload.extend_from_slice(&SCID.to_be_bytes());
    payload.push(vcid);
    payload.push(0xFF); // mapid = MAPID_TC
    run_command(eng, SG_SA_MGMT, 6, payload).unwrap(); // Start
}

// These two tests model the real CCSDS SDLS deployment shape: TC flows one
// way, ground-to-spacecraft, so `tc_apply` (ground's uplink encoder) and
// `tc_process` (the spacecraft's ingress decoder) are never the same
// engine instance in production - each side owns its own identically
// seeded `Sadb`. Driving both roles off one shared `Engine` would make
// `tc_apply`'s in-place `sa.iv` advance visible to the very next
// `tc_process` call on the same SA, which would then see `frame.iv == sa.iv`
// and reject its own just-applied frame as a replay.

#[test]
fn aead_round_trip_recovers_plaintext_and_advances_iv_each_frame() {
    let mut ground = engine();
    let mut spacecraft = engine();
    start_aead_sa_on_vcid(&mut ground, 2, 5);
    start_aead_sa_on_vcid(&mut spacecraft, 2, 5);

    let header = TcPrimaryHeader { tfvn: 0, bypass: false, cc: false, scid: SCID, vcid: 5, fl: 0, fsn: 0 };
    let pdu = b"telecommand-under-aead";
    let mut raw = header.encode().to_vec();
    raw.extend_from_slice(pdu);

    for _ in 0..3 {
        let secured = ground.tc_apply(&raw).unwrap();
        let reply = spacecraft.tc_process(&secured).unwrap();
        // Plain user telemetry (no SDLS app-id) produces no EP reply.
        assert!(reply.is_empty());
    }
}

#[test]
fn replaying_an_accepted_iv_is_rejected() {
    let mut ground = engine();
    let mut spacecraft = engine();
    start_aead_sa_on_vcid(&mut ground, 3, 6);
    start_aead_sa_on_vcid(&mut spacecraft, 3, 6);

    let header = TcPrimaryHeader { tfvn: 0, bypass: false, cc: false, scid: SCID, vcid: 6, fl: 0, fsn: 0 };
    let mut raw = header.encode().to_vec();
    raw.extend_from_slice(b"hello");

    let secured = ground.tc_apply(&raw).unwrap();
    spacecraft.tc_process(&secured).unwrap();

    let replay_result = spacecraft.tc_process(&secured);
    assert!(matches!(replay_result, Err(EngineError::Replay(_))));
    assert!(spacecraft.report.bsnf);
}

#[test]
fn sa_set_arsn_jump_leaves_a_previously_captured_frame_unacceptable() {
    let mut eng = engine();
    start_aead_sa_on_vcid(&mut eng, 4, 7);

    let header = TcPrimaryHeader { tfvn: 0, bypass: false, cc: false, scid: SCID, vcid: 7, fl: 0, fsn: 0 };
    let mut raw = header.encode().to_vec();
    raw.extend_from_slice(b"hello");
    let stale_frame = eng.tc_apply(&raw).unwrap(); // sa.iv becomes 1

    // Jump the SA's counter far ahead via SetARSN, as if a ground command
    // had resynchronized it past every frame captured so far.
    let mut arsn = vec![0u8; IV_SIZE];
    arsn[IV_SIZE - 1] = 100;
    let mut payload = 4u16.to_be_bytes().to_vec();
    payload.push(IV_SIZE as u8);
    payload.extend_from_slice(&arsn);
    run_command(&mut eng, SG_SA_MGMT, 5, payload).unwrap(); // SetARSN (sa.iv -> 101)

    let result = eng.tc_process(&stale_frame);
    assert!(matches!(result, Err(EngineError::Replay(_))));
    assert!(eng.report.bsnf);
}

// ---- OCF alternation --------------------------------------------------------

#[test]
fn ocf_alternates_clcw_then_fsr_and_clcw_vci_tracks_frame_vcid() {
    let mut eng = engine();
    eng.set_tm_vcid(3);

    // An idle SPP packet with no SA bound to vcid 3: the security header
    // collapses to a bare 2-byte pad and the PDU is empty, so the OCF lands
    // right after the 6-byte TM primary header, ahead of the fill padding.
    let idle = b"\x08\x90idle-marker";
    let frame1 = eng.tm_apply(idle).unwrap();
    let frame2 = eng.tm_apply(idle).unwrap();

    let ocf1 = &frame1[8..12];
    let ocf2 = &frame2[8..12];

    // CLCW: cwt bit (MSB of byte 0) is 0; FSR: cwt bit is 1.
    assert_eq!(ocf1[0] >> 7, 0, "first OCF must be CLCW");
    assert_eq!(ocf2[0] >> 7, 1, "second OCF must be FSR");
    assert_eq!(eng.clcw.vci, 3);
}

// ---- SA lifecycle round trip through the wire commands ------------------

#[test]
fn sa_lifecycle_create_rekey_start_stop_via_wire_commands() {
    let mut eng = engine();
    let spi = 7u16;

    // Create: est=0,ast=0 (clear), all header-field lengths 0, arcw=[1,0,...].
    let mut create_payload = spi.to_be_bytes().to_vec();
    create_payload.push(0); // est
    create_payload.push(0); // ast
    create_payload.extend_from_slice(&[0u8; 4]); // shivf_len, shsnf_len, shplf_len, stmacf_len
    create_payload.push(0); // ecs_len
    create_payload.extend_from_slice(&[0u8; 4]); // ecs
    create_payload.push(0); // iv_len
    create_payload.push(0); // acs_len
    create_payload.push(0); // acs
    create_payload.push(0); // abm_len
    create_payload.extend_from_slice(&[0u8; 20]); // abm
    create_payload.push(0); // arc_len
    create_payload.extend_from_slice(&[0u8; 20]); // arc
    create_payload.push(1); // arcw_len
    let mut arcw = vec![1u8];
    arcw.extend_from_slice(&[0u8; 19]);
    create_payload.extend_from_slice(&arcw); // arcw

    run_command(&mut eng, SG_SA_MGMT, 0, create_payload).unwrap(); // Create

    let status = run_command(&mut eng, SG_SA_MGMT, 9, spi.to_be_bytes().to_vec()).unwrap(); // Status
    assert_eq!(&status[0..2], &spi.to_be_bytes());

    let mut rekey_payload = spi.to_be_bytes().to_vec();
    rekey_payload.extend_from_slice(&130u16.to_be_bytes());
    rekey_payload.extend_from_slice(&[0u8; IV_SIZE]);
    run_command(&mut eng, SG_SA_MGMT, 3, rekey_payload).unwrap(); // Rekey

    start_aead_sa_on_vcid(&mut eng, spi, 2);

    run_command(&mut eng, SG_SA_MGMT, 7, spi.to_be_bytes().to_vec()).unwrap(); // Stop
}
