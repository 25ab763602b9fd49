/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::fs;
use std::path::Path;

use mail_store::*;

const FOLDER_SIZE: usize = 45;

fn sample_mbox() -> Vec<u8> {
    let mut data = Vec::new();
    for nr in 0..FOLDER_SIZE {
        data.extend_from_slice(
            format!(
                "From sender{nr}@example.com Sat Jan  3 01:05:34 1996\n\
                 From: sender{nr}@example.com\n\
                 To: all@example.com\n\
                 Subject: message {nr}\n\
                 Message-Id: <msg-{nr}@example.com>\n\
                 Date: Sat, 20 Nov 2021 22:22:01 +0000\n\
                 \n\
                 body of message {nr}\n\
                 with a second line\n\
                 \n"
            )
            .as_bytes(),
        );
    }
    data
}

fn build_mh(dir: &Path, count: usize) {
    for nr in 1..=count {
        fs::write(
            dir.join(nr.to_string()),
            format!(
                "From: sender{nr}@example.com\n\
                 Subject: message {nr}\n\
                 Message-Id: <mh-{nr}@example.com>\n\
                 \n\
                 body of {nr}\n"
            ),
        )
        .unwrap();
    }
}

fn rw() -> FolderOptions {
    FolderOptions::default()
        .access(Access::ReadWrite)
        .lock_method(LockMethod::None)
}

#[test]
fn mbox_read_write_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inbox");
    fs::write(&path, sample_mbox()).unwrap();
    let original_size = fs::metadata(&path).unwrap().len();

    let mut manager = Manager::new();
    let folder = manager
        .open(
            path.to_str().unwrap(),
            rw().extract(ExtractPolicy::Always),
        )
        .unwrap();

    assert_eq!(folder.messages(Selector::All).len(), FOLDER_SIZE);
    assert_eq!(folder.organization(), Organization::File);

    // adjacent byte ranges, no holes
    let mut expected = 0;
    for message in folder.messages(Selector::All) {
        let (begin, end) = message.range().unwrap();
        assert_eq!(begin, expected, "message {} range", message.seqnr());
        assert!(end > begin);
        expected = end;
    }
    assert_eq!(expected, original_size);

    // the index invariants
    for nr in 0..FOLDER_SIZE {
        let message = folder.message(nr).unwrap();
        assert_eq!(message.seqnr(), nr);
        let id = message.message_id().unwrap();
        assert_eq!(
            folder.message_id(&id).unwrap().seqnr(),
            nr,
            "id lookup for {id}"
        );
    }

    manager.close(folder, ClosePolicy::Never).unwrap();
    assert_eq!(fs::read(&path).unwrap(), sample_mbox());
}

#[test]
fn mbox_unmodified_write_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inbox");
    fs::write(&path, sample_mbox()).unwrap();

    let folder = Folder::open_mbox(path.to_str().unwrap(), rw()).unwrap();
    folder.close(ClosePolicy::Always).unwrap();
    assert_eq!(fs::read(&path).unwrap(), sample_mbox());
}

#[test]
fn mbox_delete_one_replace() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inbox");
    fs::write(&path, sample_mbox()).unwrap();
    let original_size = fs::metadata(&path).unwrap().len();

    let mut folder = Folder::open_mbox(path.to_str().unwrap(), rw()).unwrap();
    let victim_size = {
        let victim = folder.message(3).unwrap();
        let (begin, end) = victim.range().unwrap();
        end - begin
    };
    folder.message_mut(3).unwrap().delete();
    assert_eq!(folder.messages(Selector::Deleted).len(), 1);
    assert_eq!(folder.messages(Selector::Active).len(), FOLDER_SIZE - 1);
    folder.close(ClosePolicy::Modified).unwrap();

    assert_eq!(
        fs::metadata(&path).unwrap().len(),
        original_size - victim_size
    );

    let folder = Folder::open_mbox(path.to_str().unwrap(), rw()).unwrap();
    assert_eq!(folder.messages(Selector::All).len(), FOLDER_SIZE - 1);
    assert!(folder.message_id("msg-3@example.com").is_none());
    let mut expected = 0;
    for message in folder.messages(Selector::All) {
        let (begin, end) = message.range().unwrap();
        assert_eq!(begin, expected);
        expected = end;
    }
    folder.close(ClosePolicy::Never).unwrap();
}

#[test]
fn mh_lazy_loads_one_body_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    build_mh(dir.path(), FOLDER_SIZE);

    let mut manager = Manager::new();
    let mut folder = manager
        .open(
            dir.path().to_str().unwrap(),
            rw().extract(ExtractPolicy::Lazy),
        )
        .unwrap();
    assert_eq!(folder.len(), FOLDER_SIZE);
    assert_eq!(folder.organization(), Organization::Directory);
    for message in folder.messages(Selector::All) {
        assert!(message.body().is_delayed());
    }

    let text = folder.message_mut(7).unwrap().body_mut().string().unwrap();
    assert_eq!(text, "body of 8\n");

    // exactly that one body became concrete
    for (nr, message) in folder.messages(Selector::All).iter().enumerate() {
        assert_eq!(message.body().is_delayed(), nr != 7, "message {nr}");
    }
    manager.close(folder, ClosePolicy::Never).unwrap();
}

#[test]
fn mh_threshold_extract() {
    let dir = tempfile::tempdir().unwrap();
    build_mh(dir.path(), 6);
    // fatten up messages 2 and 5
    for nr in [2usize, 5] {
        let mut data = fs::read(dir.path().join(nr.to_string())).unwrap();
        data.extend(std::iter::repeat(b'x').take(6000));
        fs::write(dir.path().join(nr.to_string()), data).unwrap();
    }

    let mut folder = Folder::open_mh(
        dir.path().to_str().unwrap(),
        rw().extract(ExtractPolicy::SizeThreshold(5000)),
    )
    .unwrap();

    for (index, expect_delayed) in [false, true, false, false, true, false]
        .into_iter()
        .enumerate()
    {
        assert_eq!(
            folder.message(index).unwrap().body().is_delayed(),
            expect_delayed,
            "message {index}"
        );
    }

    // asking for the header of a big message reads the header, not the body
    folder.message_mut(1).unwrap().load_head().unwrap();
    assert_eq!(
        folder.message(1).unwrap().subject().unwrap(),
        "message 2"
    );
    assert!(folder.message(1).unwrap().body().is_delayed());
    folder.close(ClosePolicy::Never).unwrap();
}

#[test]
fn build_and_serialize_roundtrip() {
    let mut message = Message::build()
        .from("me@example.com")
        .to("you@example.com")
        .subject("Hi")
        .data_lines(vec!["line1\n".to_string(), "line2\n".to_string()])
        .finish()
        .unwrap();

    let text = String::from_utf8(message.to_bytes().unwrap()).unwrap();
    assert!(text.contains("Message-ID: <"), "{text}");
    assert!(text.contains("Date: "));
    assert!(text.contains("MIME-Version: 1.0"));
    assert!(text.contains("Content-Type: text/plain"));
    assert!(text.ends_with("\n\nline1\nline2\n") || text.contains("\n\nline1\nline2\n"));

    // and it parses back to the same content
    let mut parsed = Message::parse(text.as_bytes()).unwrap();
    assert_eq!(parsed.subject().unwrap(), "Hi");
    assert_eq!(parsed.body_mut().string().unwrap(), "line1\nline2\n");
}

#[test]
fn bounce_adds_resent_group_on_top() {
    let input = b"Received: by relay.example.com; Sat, 20 Nov 2021 10:00:00 +0000\n\
Resent-To: earlier@example.com\n\
From: origin@example.com\n\
To: first@example.com\n\
Subject: hop\n\
Message-Id: <hop@example.com>\n\
\n\
travelling body\n";
    let original = Message::parse(input).unwrap();
    assert_eq!(original.head().resent_groups().len(), 1);

    let bounced = original
        .bounce(BounceOptions {
            to: Some("X@example.com".into()),
            ..BounceOptions::default()
        })
        .unwrap();

    let groups = bounced.head().resent_groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(
        groups[0].resent_to().unwrap().unfolded_body(),
        "X@example.com"
    );
    let resent_id = groups[0]
        .resent_message_id()
        .unwrap()
        .unfolded_body();
    assert!(resent_id.starts_with('<') && resent_id.ends_with('>'));
    assert_eq!(
        groups[1].resent_to().unwrap().unfolded_body(),
        "earlier@example.com"
    );

    // bounce requires a destination
    assert!(original.bounce(BounceOptions::default()).is_err());
}

#[test]
fn empty_folder_writes_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty");
    fs::write(&path, b"").unwrap();

    let folder = Folder::open_mbox(path.to_str().unwrap(), rw()).unwrap();
    assert!(folder.is_empty());
    folder.close(ClosePolicy::Always).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn long_folded_header_unfolds() {
    let mut input = Vec::new();
    input.extend_from_slice(b"Subject: start");
    for nr in 0..120 {
        input.extend_from_slice(format!("\n continuation-{nr}").as_bytes());
    }
    input.extend_from_slice(b"\nFrom: a@example.com\n\nbody\n");
    assert!(input.len() > 1000);

    let message = Message::parse(&input).unwrap();
    let subject = message.subject().unwrap();
    assert!(subject.starts_with("start continuation-0"));
    assert!(subject.ends_with("continuation-119"));
    assert_eq!(message.head().count("subject"), 1);
}

#[test]
fn timestamp_fallbacks() {
    let message = Message::parse(b"From: a@example.com\nSubject: undated\n\nbody\n").unwrap();
    assert_eq!(message.guess_timestamp(), None);
    assert!(message.timestamp() > 0);
}

#[test]
fn reply_subject_normalization() {
    assert_eq!(reply_subject("greetings"), "Re: greetings");
    assert_eq!(reply_subject(&reply_subject("greetings")), "Re[2]: greetings");
}

#[test]
fn field_roundtrip_through_display() {
    let field = Field::new("X-Test", "some value; charset=utf-8").unwrap();
    let printed = field.to_string();
    let (name, body) = printed
        .trim_end()
        .split_once(": ")
        .expect("name colon body");
    let reparsed = Field::parse(name, body);
    assert_eq!(reparsed, field);
}

#[test]
fn multipart_with_no_active_parts_flattens() {
    let input = b"From: me@example.com\n\
Content-Type: multipart/mixed; boundary=cut\n\
\n\
--cut\n\
Content-Type: text/plain\n\
\n\
only part\n\
--cut--\n";
    let mut message = Message::parse(input).unwrap();
    message
        .body_mut()
        .as_multipart_mut()
        .unwrap()
        .parts[0]
        .delete();

    let rebuilt = message.rebuild(&[]).unwrap();
    assert!(!rebuilt.body().is_multipart());
    assert!(rebuilt.body().is_text());
}

#[test]
fn status_labels_roundtrip_mbox() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inbox");
    fs::write(&path, sample_mbox()).unwrap();

    let mut folder = Folder::open_mbox(path.to_str().unwrap(), rw()).unwrap();
    folder.message_mut(0).unwrap().set_label("seen", true);
    folder.message_mut(0).unwrap().set_label("flagged", true);
    folder.close(ClosePolicy::Modified).unwrap();

    let folder = Folder::open_mbox(path.to_str().unwrap(), rw()).unwrap();
    assert!(folder.message(0).unwrap().label("seen"));
    assert!(folder.message(0).unwrap().label("flagged"));
    assert!(!folder.message(1).unwrap().label("seen"));
    folder.close(ClosePolicy::Never).unwrap();
}

#[test]
fn copy_between_folders_via_manager() {
    let dir = tempfile::tempdir().unwrap();
    let mbox_path = dir.path().join("inbox");
    fs::write(&mbox_path, sample_mbox()).unwrap();
    let maildir_path = dir.path().join("archive");
    for sub in ["cur", "new", "tmp"] {
        fs::create_dir_all(maildir_path.join(sub)).unwrap();
    }

    let mut manager = Manager::new();
    let mut source = manager
        .open(mbox_path.to_str().unwrap(), rw())
        .unwrap();
    let mut destination = manager
        .open(maildir_path.to_str().unwrap(), rw())
        .unwrap();

    manager
        .copy_message(&mut source, 0, &mut destination)
        .unwrap();
    assert!(!source.message(0).unwrap().is_deleted());
    assert_eq!(destination.len(), 1);

    manager
        .move_message(&mut source, 1, &mut destination)
        .unwrap();
    assert!(source.message(1).unwrap().is_deleted());
    assert_eq!(destination.len(), 2);

    manager.close(destination, ClosePolicy::Modified).unwrap();
    manager.close(source, ClosePolicy::Never).unwrap();

    // both landed as maildir files
    let delivered = fs::read_dir(maildir_path.join("new")).unwrap().count()
        + fs::read_dir(maildir_path.join("cur")).unwrap().count();
    assert_eq!(delivered, 2);
}

#[test]
fn locked_folder_refuses_second_locker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inbox");
    fs::write(&path, sample_mbox()).unwrap();

    let folder = Folder::open_mbox(
        path.to_str().unwrap(),
        rw().lock_method(LockMethod::DotLock),
    )
    .unwrap();

    let mut options = rw().lock_method(LockMethod::DotLock);
    options.lock_timeout = std::time::Duration::from_millis(50);
    let denied = Folder::open_mbox(path.to_str().unwrap(), options);
    assert!(matches!(denied, Err(Error::LockTimeout { .. })));

    folder.close(ClosePolicy::Never).unwrap();
}
