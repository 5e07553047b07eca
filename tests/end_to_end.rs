mod common;

use common::{BookBuilder, section};
use mobistrip::drm::{MobiBook, UnlockOptions};
use mobistrip::{BookKind, CryptoType, DrmError, decrypt_mobi, kindle_pid};

const NO_PIDS: &[&str] = &[];

#[test]
fn decrypts_pid_locked_book() {
    let builder = BookBuilder::new().locked_to("ABCDEFGH");
    let raw = builder.build();
    assert_ne!(section(&raw, 1), builder.records[0]);

    let clear = decrypt_mobi(&raw, &["ABCDEFGH"]).expect("decrypt");
    assert_eq!(clear.len(), raw.len());
    for (i, plain) in builder.records.iter().enumerate() {
        assert_eq!(&section(&clear, i + 1), plain, "record {}", i + 1);
    }

    let r0 = section(&clear, 0);
    assert_eq!(&r0[0x0C..0x0E], &[0, 0]);
    assert_eq!(&r0[0xA8..0xAC], &[0xFF; 4]);
    assert_eq!(&r0[0xAC..0xB8], &[0; 12]);
    // end-of-file record untouched
    assert_eq!(section(&clear, 4), section(&raw, 4));
}

#[test]
fn checksummed_pid_opens_the_same_book() {
    let raw = BookBuilder::new().locked_to("ABCDEFGH").build();
    let book = MobiBook::open(&raw).expect("open");
    let unlocked = book
        .unlock(&["ABCDEFGHHA"], &UnlockOptions::default())
        .expect("unlock");
    assert_eq!(unlocked.pid.as_deref(), Some("ABCDEFGHHA"));
    assert_eq!(unlocked.stats.records, 3);
    assert_eq!(unlocked.kind, BookKind::Mobipocket(6));
    assert_eq!(unlocked.title, "Synthetic Book");
}

#[test]
fn second_pass_reports_not_encrypted() {
    let raw = BookBuilder::new().locked_to("ABCDEFGH").build();
    let clear = decrypt_mobi(&raw, &["ABCDEFGH"]).expect("decrypt");
    let err = decrypt_mobi(&clear, &["ABCDEFGH"]).unwrap_err();
    assert!(matches!(err, DrmError::UnsupportedEncryption(CryptoType::None)));
    assert_eq!(err.kind(), "not_encrypted");
}

#[test]
fn wrong_pid_is_key_not_found() {
    let raw = BookBuilder::new().locked_to("ABCDEFGH").build();
    let err = decrypt_mobi(&raw, &["ZXCVBNM1"]).unwrap_err();
    assert!(matches!(err, DrmError::KeyNotFound { tried: 1 }));

    let err = decrypt_mobi(&raw, NO_PIDS).unwrap_err();
    assert!(matches!(err, DrmError::KeyNotFound { tried: 0 }));
}

#[test]
fn altered_checksum_is_rejected() {
    let raw = BookBuilder::new().locked_to("ABCDEFGH").build();
    let err = decrypt_mobi(&raw, &["ABCDEFGHHB"]).unwrap_err();
    assert!(matches!(err, DrmError::InvalidPidChecksum { .. }));
}

#[test]
fn bad_candidates_are_skipped_when_a_later_one_matches() {
    let raw = BookBuilder::new()
        .decoy("ZZZZZZZZ")
        .locked_to("ABCDEFGH")
        .build();
    let book = MobiBook::open(&raw).expect("open");
    let unlocked = book
        .unlock(
            &["ABCDEFGHHB", "SHORT", "QQQQQQQQ", "ABCDEFGH"],
            &UnlockOptions::default(),
        )
        .expect("unlock");
    assert_eq!(unlocked.pid.as_deref(), Some("ABCDEFGHHA"));
}

#[test]
fn serial_derived_pid_unlocks() {
    let pid = kindle_pid("B001A1B2C3D4E5F6").expect("pid");
    assert_eq!(pid, "BNR3C51*3C");
    let builder = BookBuilder::new().locked_to(&pid);
    let clear = decrypt_mobi(&builder.build(), &[pid.as_str()]).expect("decrypt");
    assert_eq!(section(&clear, 1), builder.records[0]);
}

#[test]
fn default_encryption_needs_no_pid() {
    let builder = BookBuilder::new().default_lock();
    let raw = builder.build();
    let book = MobiBook::open(&raw).expect("open");
    let unlocked = book.unlock(NO_PIDS, &UnlockOptions::default()).expect("unlock");
    assert!(unlocked.pid.is_none());
    assert_eq!(section(&unlocked.data, 2), builder.records[1]);
}

#[test]
fn trailing_entries_stay_in_the_clear() {
    let mut first = b"payload with one trailing entry".to_vec();
    first.extend_from_slice(&[0xAA, 0xBB, 0x83]);
    let mut second = b"another payload".to_vec();
    second.extend_from_slice(&[0x83, 0x01, 0x81]);
    let builder = BookBuilder::new()
        .records(vec![first.clone(), second.clone()])
        .extra_flags(0b10)
        .locked_to("ABCDEFGH");
    let raw = builder.build();

    let locked = section(&raw, 1);
    assert_eq!(&locked[locked.len() - 3..], &first[first.len() - 3..]);
    assert_ne!(&locked[..5], &first[..5]);

    let clear = decrypt_mobi(&raw, &["ABCDEFGH"]).expect("decrypt");
    assert_eq!(section(&clear, 1), first);
    assert_eq!(section(&clear, 2), second);
}

#[test]
fn multibyte_entry_only_counts_for_huff_cdic() {
    // payload | multibyte (2 bytes) | entry (2 bytes)
    let mut record = b"huffman payload".to_vec();
    record.extend_from_slice(&[0xAA, 0x01, 0x00, 0x82]);
    let builder = BookBuilder::new()
        .records(vec![record.clone()])
        .compression(17480)
        .extra_flags(0b11)
        .locked_to("ABCDEFGH");
    let raw = builder.build();
    let locked = section(&raw, 1);
    assert_eq!(&locked[locked.len() - 4..], &record[record.len() - 4..]);
    let clear = decrypt_mobi(&raw, &["ABCDEFGH"]).expect("decrypt");
    assert_eq!(section(&clear, 1), record);

    // PalmDOC: bit 0 is ignored, so the multibyte bytes are encrypted too
    let builder = BookBuilder::new()
        .records(vec![record.clone()])
        .extra_flags(0b11)
        .locked_to("ABCDEFGH");
    let raw = builder.build();
    let locked = section(&raw, 1);
    assert_eq!(&locked[locked.len() - 2..], &record[record.len() - 2..]);
    assert_ne!(&locked[..locked.len() - 2], &record[..record.len() - 2]);
    let clear = decrypt_mobi(&raw, &["ABCDEFGH"]).expect("decrypt");
    assert_eq!(section(&clear, 1), record);
}

#[test]
fn exth_restrictions_are_lifted_on_request() {
    let builder = BookBuilder::new()
        .exth(503, "Updated Title".as_bytes())
        .exth(401, &[10])
        .exth(404, &[1])
        .exth(208, b"watermark")
        .locked_to("ABCDEFGH");
    let raw = builder.build();
    let book = MobiBook::open(&raw).expect("open");
    assert_eq!(book.title(), "Updated Title");

    let plain = book
        .unlock(&["ABCDEFGH"], &UnlockOptions::default())
        .expect("unlock");
    let kept = MobiBook::open(&plain.data).expect("reopen");
    assert_eq!(kept.exth().get(401), Some(&[10u8][..]));

    let sanitized = book
        .unlock(&["ABCDEFGH"], &UnlockOptions { sanitize_exth: true })
        .expect("unlock");
    assert_eq!(sanitized.data.len(), raw.len());
    let reopened = MobiBook::open(&sanitized.data).expect("reopen");
    assert_eq!(reopened.exth().get(401), Some(&[100u8][..]));
    assert_eq!(reopened.exth().get(404), Some(&[0u8][..]));
    assert_eq!(reopened.exth().get(208), Some(&[0u8; 9][..]));
    assert_eq!(reopened.title(), "Updated Title");
    assert_eq!(section(&sanitized.data, 1), builder.records[0]);
}

#[test]
fn rental_books_still_decrypt() {
    let expiry = 1_800_000_000u64.to_be_bytes();
    let raw = BookBuilder::new()
        .exth(406, &expiry)
        .locked_to("ABCDEFGH")
        .build();
    let book = MobiBook::open(&raw).expect("open");
    let unlocked = book
        .unlock(&["ABCDEFGH"], &UnlockOptions::default())
        .expect("unlock");
    assert_eq!(unlocked.rental_expiry, Some(1_800_000_000));
}

#[test]
fn detects_kf8_and_print_replica() {
    let raw = BookBuilder::new().version(8).locked_to("ABCDEFGH").build();
    let book = MobiBook::open(&raw).expect("open");
    let unlocked = book
        .unlock(&["ABCDEFGH"], &UnlockOptions::default())
        .expect("unlock");
    assert_eq!(unlocked.kind, BookKind::Kf8);

    let raw = BookBuilder::new()
        .records(vec![b"%MOP replica body".to_vec()])
        .version(8)
        .locked_to("ABCDEFGH")
        .build();
    let book = MobiBook::open(&raw).expect("open");
    let unlocked = book
        .unlock(&["ABCDEFGH"], &UnlockOptions::default())
        .expect("unlock");
    assert_eq!(unlocked.kind, BookKind::PrintReplica);
    assert_eq!(unlocked.kind.extension(), "azw4");
}

#[test]
fn text_record_ciphertext_matches_reference() {
    let expected = "66b81fb1ac58f1c109ea1d99b337d034a42bf1cec15d5afed1fe63ca\
                    782b8e3385cc568e0ed02db2e44ff8ac";
    let raw = BookBuilder::new().locked_to("ABCDEFGH").build();
    let locked: String = section(&raw, 1).iter().map(|b| format!("{b:02x}")).collect();
    assert_eq!(locked, expected);

    let clear = decrypt_mobi(&raw, &["ABCDEFGH"]).expect("decrypt");
    assert_eq!(
        section(&clear, 1),
        b"The quick brown fox jumps over the lazy dog.".to_vec()
    );
}
