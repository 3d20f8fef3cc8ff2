//! Direct-to-file mode writes storage-headered messages and honors the
//! file size cap.

mod support;

use mct_core::message::WireMessage;
use mct_core::payload::Value;

#[test]
fn file_mode_writes_and_caps() {
    let dir = tempfile::tempdir().expect("tempdir");
    support::route_library_to(dir.path());
    let path = dir.path().join("trace.mct");

    mct::init_file(&path).expect("init file mode");
    mct::register_app("FILE", "file mode test").expect("register app");
    let ctx = mct::register_context("MAIN", "main context").expect("register context");

    mct::message!(ctx, mct::LogLevel::Info, 41u32).expect("first write");
    mct::message!(ctx, mct::LogLevel::Info, 42u32).expect("second write");

    let bytes = std::fs::read(&path).expect("read trace file");
    let mut at = 0;
    let mut values = Vec::new();
    while at < bytes.len() {
        let (message, consumed) = WireMessage::parse(&bytes[at..], true)
            .expect("well-formed file")
            .expect("complete message");
        let storage = message.storage.expect("storage header present");
        assert_eq!(storage.ecu, mct::Id4::new("ECU1"));
        values.push(support::log_args(&message));
        at += consumed;
    }
    assert_eq!(values, vec![vec![Value::Unsigned(41)], vec![Value::Unsigned(42)]]);

    // cap just above the current size: the next message does not fit
    let current = bytes.len() as u64;
    mct::set_filesize_max(current + 8).expect("set cap");
    assert_eq!(
        mct::message!(ctx, mct::LogLevel::Info, 43u32),
        Err(mct::Error::FileSize)
    );
    // the failure is sticky until re-initialization
    assert_eq!(
        mct::message!(ctx, mct::LogLevel::Info, 44u32),
        Err(mct::Error::FileSize)
    );
    assert_eq!(std::fs::read(&path).expect("reread").len(), bytes.len());

    // re-registering the application with the same id is a refresh, with
    // a different id a caller bug
    assert_eq!(mct::register_app("FILE", "again"), Ok(()));
    assert_eq!(
        mct::register_app("ELSE", "something else"),
        Err(mct::Error::WrongParameter)
    );

    // a re-registered context resolves its initial level afresh
    let tmp = mct::register_context_with_level(
        "TMP",
        "temporary",
        mct::LogLevel::Warn,
        mct::TraceStatus::Off,
    )
    .expect("register quiet context");
    assert!(tmp.log(mct::LogLevel::Info).is_none());
    mct::unregister_context(tmp).expect("unregister");
    let tmp = mct::register_context("TMP", "temporary").expect("re-register");
    assert!(tmp.log(mct::LogLevel::Info).is_some());
}
