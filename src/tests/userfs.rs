use crate::userfs::{BLOCK_SIZE, FsError, MAX_FILE_SIZE, OpenFlags, UserFs};

#[test]
fn open_missing_without_create_fails() {
    let mut fs = UserFs::new();
    assert_eq!(fs.open("nope", OpenFlags::default()), Err(FsError::NoFile));
    assert_eq!(fs.last_error(), Some(FsError::NoFile));
}

#[test]
fn write_then_read_through_fresh_descriptor() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE | OpenFlags::READ_WRITE).unwrap();
    assert_eq!(fs.write(fd, b"abc"), Ok(3));
    fs.close(fd).unwrap();

    let fd = fs.open("f", OpenFlags::READ_ONLY).unwrap();
    let mut buf = [0u8; 10];
    assert_eq!(fs.read(fd, &mut buf), Ok(3));
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(fs.last_error(), None);
    // at end of file now
    assert_eq!(fs.read(fd, &mut buf), Ok(0));
}

#[test]
fn cursor_does_not_rewind_between_write_and_read() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE).unwrap();
    fs.write(fd, b"abc").unwrap();
    let mut buf = [0u8; 4];
    // same descriptor: the cursor sits at the end of what it wrote
    assert_eq!(fs.read(fd, &mut buf), Ok(0));
}

#[test]
fn writes_spanning_blocks_read_back_intact() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE).unwrap();

    let data: Vec<u8> = (0..BLOCK_SIZE + 1500).map(|i| (i % 251) as u8).collect();
    // two writes that straddle the first block boundary
    assert_eq!(fs.write(fd, &data[..3000]), Ok(3000));
    assert_eq!(fs.write(fd, &data[3000..]), Ok(data.len() - 3000));
    fs.close(fd).unwrap();

    let fd = fs.open("f", OpenFlags::READ_ONLY).unwrap();
    let mut buf = vec![0u8; data.len() + 100];
    assert_eq!(fs.read(fd, &mut buf), Ok(data.len()));
    assert_eq!(&buf[..data.len()], &data[..]);
}

#[test]
fn open_returns_smallest_free_descriptor() {
    let mut fs = UserFs::new();
    let a = fs.open("a", OpenFlags::CREATE).unwrap();
    let b = fs.open("b", OpenFlags::CREATE).unwrap();
    let c = fs.open("c", OpenFlags::CREATE).unwrap();
    assert_eq!((a, b, c), (0, 1, 2));

    fs.close(b).unwrap();
    assert_eq!(fs.open("b", OpenFlags::default()), Ok(1));
}

#[test]
fn descriptor_table_compacts_and_shrinks() {
    let mut fs = UserFs::new();
    let fds: Vec<usize> = (0..21)
        .map(|i| fs.open(&format!("f{i}"), OpenFlags::CREATE).unwrap())
        .collect();
    assert_eq!(fs.table_len(), 21);
    let grown = fs.table_capacity();
    assert!(grown >= 21);

    // closing the tail compacts the table; the floor survives
    for &fd in fds.iter().rev() {
        fs.close(fd).unwrap();
    }
    assert_eq!(fs.table_len(), 0);
    assert!(fs.table_capacity() < grown);
    assert!(fs.table_capacity() >= 10);
}

#[test]
fn read_only_descriptor_cannot_write() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE | OpenFlags::READ_ONLY).unwrap();
    assert_eq!(fs.write(fd, b"x"), Err(FsError::NoPermission));
    assert_eq!(fs.last_error(), Some(FsError::NoPermission));

    let mut buf = [0u8; 1];
    assert_eq!(fs.read(fd, &mut buf), Ok(0));
    assert_eq!(fs.last_error(), None);
}

#[test]
fn write_only_descriptor_cannot_read() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE | OpenFlags::WRITE_ONLY).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(fs.read(fd, &mut buf), Err(FsError::NoPermission));
    assert_eq!(fs.write(fd, b"x"), Ok(1));
}

#[test]
fn no_access_bits_means_read_write() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE).unwrap();
    assert_eq!(fs.write(fd, b"hi"), Ok(2));
    fs.close(fd).unwrap();
    let fd = fs.open("f", OpenFlags::default()).unwrap();
    let mut buf = [0u8; 2];
    assert_eq!(fs.read(fd, &mut buf), Ok(2));
}

#[test]
fn bad_descriptor_is_no_file() {
    let mut fs = UserFs::new();
    let mut buf = [0u8; 1];
    assert_eq!(fs.read(99, &mut buf), Err(FsError::NoFile));
    assert_eq!(fs.write(99, b"x"), Err(FsError::NoFile));
    assert_eq!(fs.close(99), Err(FsError::NoFile));
}

#[test]
fn delete_with_open_descriptor_tombstones() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE).unwrap();
    fs.write(fd, b"still here").unwrap();
    fs.delete("f").unwrap();

    // a new open cannot find it
    assert_eq!(fs.open("f", OpenFlags::default()), Err(FsError::NoFile));

    // but the open descriptor still works
    fs.resize(fd, 5).unwrap();
    assert_eq!(fs.write(fd, b"!"), Ok(1));
    fs.close(fd).unwrap();
    assert_eq!(fs.live_file_count(), 0);
}

#[test]
fn delete_without_descriptors_destroys_immediately() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE).unwrap();
    fs.close(fd).unwrap();
    assert_eq!(fs.live_file_count(), 1);
    fs.delete("f").unwrap();
    assert_eq!(fs.live_file_count(), 0);
    assert_eq!(fs.delete("f"), Err(FsError::NoFile));
}

#[test]
fn deleted_name_can_be_recreated_while_old_file_lives() {
    let mut fs = UserFs::new();
    let old = fs.open("f", OpenFlags::CREATE).unwrap();
    fs.write(old, b"old").unwrap();
    fs.delete("f").unwrap();

    let new = fs.open("f", OpenFlags::CREATE).unwrap();
    let mut buf = [0u8; 3];
    // the new file is empty; the old data is only visible through `old`
    assert_eq!(fs.read(new, &mut buf), Ok(0));
    fs.close(old).unwrap();
    fs.close(new).unwrap();
}

#[test]
fn resize_shrink_truncates_and_clamps_cursors() {
    let mut fs = UserFs::new();
    let writer = fs.open("f", OpenFlags::CREATE).unwrap();
    let data: Vec<u8> = (0..2 * BLOCK_SIZE).map(|i| (i % 256) as u8).collect();
    fs.write(writer, &data).unwrap();
    assert_eq!(fs.file_size(writer), Some(2 * BLOCK_SIZE));

    fs.resize(writer, 100).unwrap();
    assert_eq!(fs.file_size(writer), Some(100));

    // the writer's cursor was past the new tail; it now writes at byte 100
    assert_eq!(fs.write(writer, b"x"), Ok(1));
    assert_eq!(fs.file_size(writer), Some(101));

    let reader = fs.open("f", OpenFlags::READ_ONLY).unwrap();
    let mut buf = vec![0u8; 200];
    assert_eq!(fs.read(reader, &mut buf), Ok(101));
    assert_eq!(&buf[..100], &data[..100]);
    assert_eq!(buf[100], b'x');
}

#[test]
fn resize_grow_pads_with_unspecified_bytes() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE).unwrap();
    fs.write(fd, b"abc").unwrap();
    fs.resize(fd, BLOCK_SIZE + 10).unwrap();
    assert_eq!(fs.file_size(fd), Some(BLOCK_SIZE + 10));

    let reader = fs.open("f", OpenFlags::READ_ONLY).unwrap();
    let mut buf = vec![0u8; 2 * BLOCK_SIZE];
    assert_eq!(fs.read(reader, &mut buf), Ok(BLOCK_SIZE + 10));
    assert_eq!(&buf[..3], b"abc");
}

#[test]
fn resize_to_zero_keeps_the_file_usable() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE).unwrap();
    fs.write(fd, b"gone").unwrap();
    fs.resize(fd, 0).unwrap();
    assert_eq!(fs.file_size(fd), Some(0));
    assert_eq!(fs.write(fd, b"back"), Ok(4));
    assert_eq!(fs.file_size(fd), Some(4));
}

#[test]
fn resize_needs_a_writable_descriptor() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE | OpenFlags::READ_ONLY).unwrap();
    assert_eq!(fs.resize(fd, 10), Err(FsError::NoPermission));
}

#[test]
fn resize_beyond_max_size_is_refused() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE).unwrap();
    assert_eq!(fs.resize(fd, MAX_FILE_SIZE + 1), Err(FsError::NoMem));
    assert_eq!(fs.last_error(), Some(FsError::NoMem));
}

#[test]
fn write_past_max_size_is_refused_up_front() {
    let mut fs = UserFs::new();
    let fd = fs.open("f", OpenFlags::CREATE).unwrap();
    let huge = vec![0u8; MAX_FILE_SIZE + 1];
    assert_eq!(fs.write(fd, &huge), Err(FsError::NoMem));
    // nothing was written
    assert_eq!(fs.file_size(fd), Some(0));
}

#[test]
fn destroy_clears_everything() {
    let mut fs = UserFs::new();
    let fd = fs.open("a", OpenFlags::CREATE).unwrap();
    fs.open("b", OpenFlags::CREATE).unwrap();
    fs.destroy();
    assert_eq!(fs.live_file_count(), 0);
    assert_eq!(fs.close(fd), Err(FsError::NoFile));
    // the context stays usable
    assert_eq!(fs.open("c", OpenFlags::CREATE), Ok(0));
}
