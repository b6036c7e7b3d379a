//! Property tests for the editing and accounting laws of `Buffer`.

use proptest::prelude::*;

use super::{Encoding, SafePtr};
use crate::checksum::Crc32;
use crate::memory::backend::Backend;
use crate::memory::heap::PrivateHeap;

// ============================================================================
// Generators
// ============================================================================

fn arb_backend() -> impl Strategy<Value = Backend> {
    prop_oneof![
        Just(Backend::Heap),
        Just(Backend::Virtual),
        Just(Backend::Network),
        Just(Backend::Com),
        (4u32..10).prop_map(|shift| Backend::aligned(1 << shift)),
        Just(()).prop_filter_map("private heap", |()| {
            PrivateHeap::create(4096, 0).ok().map(Backend::PrivateHeap)
        }),
    ]
}

fn arb_content() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..160)
}

fn filled(bytes: &[u8], backend: Backend) -> SafePtr {
    SafePtr::from_bytes(bytes, backend).unwrap()
}

// ============================================================================
// Allocation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn alloc_then_free_leaves_unallocated(size in 1usize..20_000, backend in arb_backend()) {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = SafePtr::new();
        buf.alloc(size, backend).unwrap();
        prop_assert!(buf.is_allocated());
        prop_assert_eq!(buf.len(), size);
        prop_assert!(buf.as_slice().iter().all(|&b| b == 0));
        buf.validate().unwrap();
        buf.free().unwrap();
        prop_assert!(!buf.is_allocated());
        prop_assert_eq!(buf.len(), 0);
    }

    #[test]
    fn realloc_preserves_common_prefix(
        data in arb_content(),
        new_len in 1usize..400,
        backend in arb_backend(),
    ) {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = filled(&data, backend);
        buf.realloc(new_len).unwrap();
        let keep = data.len().min(new_len);
        prop_assert_eq!(buf.len(), new_len);
        prop_assert_eq!(&buf.as_slice()[..keep], &data[..keep]);
    }

    #[test]
    fn clone_is_deep(data in arb_content(), backend in arb_backend()) {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let original = filled(&data, backend);
        let mut copy = original.clone();
        prop_assert_eq!(copy.backend_kind(), original.backend_kind());
        prop_assert_eq!(copy.as_slice(), original.as_slice());
        for b in copy.as_mut_slice() {
            *b = !*b;
        }
        prop_assert_eq!(&original.as_slice()[..data.len()], &data[..]);
    }
}

// ============================================================================
// Geometry
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn slide_is_undone_by_opposite_slide(
        data in arb_content(),
        a in any::<usize>(),
        b in any::<usize>(),
        c in any::<usize>(),
        backend in arb_backend(),
    ) {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = filled(&data, backend);
        let len = data.len();
        let index = a % len;
        let length = b % (len - index + 1);
        let dest = c % (len - length + 1);
        let offset = dest as isize - index as isize;

        buf.slide(index, length, offset).unwrap();
        prop_assert_eq!(&buf.as_slice()[dest..dest + length], &data[index..index + length]);
        buf.slide(dest, length, -offset).unwrap();
        prop_assert_eq!(&buf.as_slice()[..len], &data[..]);
    }

    #[test]
    fn invalid_slide_changes_nothing(data in arb_content(), extra in 1usize..16) {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = filled(&data, Backend::Heap);
        let len = data.len() as isize;
        prop_assert!(buf.slide(0, 1, len - 1 + extra as isize).is_err());
        prop_assert!(buf.slide(0, data.len() + extra, 0).is_ok());
        prop_assert_eq!(buf.as_slice(), &data[..]);
    }

    #[test]
    fn push_out_then_pull_in_restores(
        data in arb_content(),
        at in any::<usize>(),
        amount in 1usize..64,
        fill in prop::collection::vec(any::<u8>(), 0..80),
        backend in arb_backend(),
    ) {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = filled(&data, backend);
        let index = at % (data.len() + 1);

        let new_len = buf.push_out(index, amount, Some(&fill)).unwrap();
        prop_assert_eq!(new_len, data.len() + amount);
        let bytes = buf.as_slice();
        let filled_len = fill.len().min(amount);
        prop_assert_eq!(&bytes[..index], &data[..index]);
        prop_assert_eq!(&bytes[index..index + filled_len], &fill[..filled_len]);
        prop_assert!(bytes[index + filled_len..index + amount].iter().all(|&b| b == 0));
        prop_assert_eq!(&bytes[index + amount..], &data[index..]);

        prop_assert_eq!(buf.pull_in(index, amount).unwrap(), data.len());
        prop_assert_eq!(buf.as_slice(), &data[..]);
    }

    #[test]
    fn part_then_consume_restores(
        data in arb_content(),
        at in any::<usize>(),
        amount in 1usize..32,
        backend in arb_backend(),
    ) {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = filled(&data, backend);
        let index = at % data.len();

        prop_assert_eq!(buf.part(index, amount).unwrap(), data.len() + 2 * amount);
        let bytes = buf.as_slice();
        prop_assert_eq!(&bytes[..index], &data[..index]);
        prop_assert!(bytes[index..index + amount].iter().all(|&b| b == 0));
        prop_assert_eq!(bytes[index + amount], data[index]);
        prop_assert!(bytes[index + amount + 1..index + 2 * amount + 1].iter().all(|&b| b == 0));
        prop_assert_eq!(&bytes[index + 2 * amount + 1..], &data[index + 1..]);

        prop_assert_eq!(buf.consume(index + amount, amount).unwrap(), data.len());
        prop_assert_eq!(buf.as_slice(), &data[..]);
    }

    #[test]
    fn reverse_twice_is_identity(data in arb_content(), as_chars in any::<bool>()) {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = filled(&data, Backend::Heap);
        buf.reverse(as_chars);
        buf.reverse(as_chars);
        prop_assert_eq!(buf.as_slice(), &data[..]);
    }
}

// ============================================================================
// Strings and checksums
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn utf16_string_round_trips(s in "[^\\x00]{0,40}", offset in 0usize..16) {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = SafePtr::new();
        let written = buf.set_string(offset, &s, Encoding::Utf16).unwrap();
        prop_assert_eq!(written, (s.encode_utf16().count() + 1) * 2);
        prop_assert_eq!(buf.grab_string(offset).unwrap(), s);
    }

    #[test]
    fn ascii_string_round_trips(s in "[ -~]{0,40}") {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = SafePtr::new();
        buf.set_string(0, &s, Encoding::Ascii).unwrap();
        prop_assert_eq!(buf.str_len(0, Encoding::Ascii).unwrap(), s.len());
        prop_assert_eq!(buf.grab_ascii_string(0).unwrap(), s);
    }

    #[test]
    fn chunked_crc_matches_one_shot(
        data in prop::collection::vec(any::<u8>(), 0..3000),
        chunk in 1usize..700,
    ) {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let buf = SafePtr::from_bytes(&data, Backend::Heap).unwrap();
        let expected = Crc32::checksum(&data);
        prop_assert_eq!(buf.crc32(), expected);
        prop_assert_eq!(buf.crc32_chunked(.., chunk).unwrap(), expected);
    }
}
