use logbridge_core::{ChunkBuffer, MAX_CHUNK_SIZE};

#[test]
fn test_take_empty_is_none() {
    let mut buf = ChunkBuffer::new(MAX_CHUNK_SIZE);
    assert!(buf.take().is_none());
}

#[test]
fn test_small_lines_accumulate() {
    let mut buf = ChunkBuffer::new(MAX_CHUNK_SIZE);
    let mut ready = Vec::new();

    buf.push("line 1\n", &mut ready);
    buf.push("line 2\n", &mut ready);

    assert!(ready.is_empty()); // nothing filled up yet
    assert_eq!(buf.take().as_deref(), Some("line 1\nline 2\n"));
    assert!(buf.take().is_none()); // reset after take
}

#[test]
fn test_chunks_never_exceed_max() {
    let mut buf = ChunkBuffer::new(64);
    let mut ready = Vec::new();

    let long_line = format!("{}\n", "x".repeat(1000));
    buf.push(&long_line, &mut ready);

    let mut reassembled = String::new();
    for chunk in &ready {
        assert!(chunk.len() <= 64);
        assert!(!chunk.is_empty());
        reassembled.push_str(chunk);
    }
    if let Some(tail) = buf.take() {
        assert!(tail.len() <= 64);
        reassembled.push_str(&tail);
    }
    // splitting batches bytes, never drops or reorders them
    assert_eq!(reassembled, long_line);
}

#[test]
fn test_split_respects_char_boundaries() {
    let mut buf = ChunkBuffer::new(7);
    let mut ready = Vec::new();

    // 2-byte chars: a 7 byte cap forces splits at 6 bytes
    let line = "ééééééééé\n".to_string();
    buf.push(&line, &mut ready);

    let mut reassembled = String::new();
    for chunk in &ready {
        assert!(chunk.len() <= 7);
        assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        reassembled.push_str(chunk);
    }
    if let Some(tail) = buf.take() {
        reassembled.push_str(&tail);
    }
    assert_eq!(reassembled, line);
}

#[test]
fn test_full_buffer_is_handed_back_in_order() {
    let mut buf = ChunkBuffer::new(8);
    let mut ready = Vec::new();

    buf.push("aaaa\n", &mut ready);
    buf.push("bbbb\n", &mut ready);
    buf.push("cccc\n", &mut ready);

    let mut reassembled = ready.concat();
    if let Some(tail) = buf.take() {
        reassembled.push_str(&tail);
    }
    assert_eq!(reassembled, "aaaa\nbbbb\ncccc\n");
}
