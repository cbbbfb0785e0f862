// Attribute packing.
//
// Source vertices may be strided and unaligned. Every vertex lands in the
// scratch buffer word-aligned, rounded up to whole words and zero padded.
// Contiguous word-sized runs take a bulk copy; everything else goes through
// the byte packer. Both paths produce the same words.

/// Pack one vertex (`src.len()` bytes) into `dst`, zero padding the last word.
pub fn pack_vertex(dst: &mut [u32], src: &[u8]) {
    for (word, chunk) in dst.iter_mut().zip(src.chunks(4)) {
        let mut bytes = [0u8; 4];
        bytes[..chunk.len()].copy_from_slice(chunk);
        *word = u32::from_ne_bytes(bytes);
    }
}

/// Bytes of vertex `index` in a strided array.
pub fn vertex_bytes(data: &[u8], stride: usize, width: usize, index: usize) -> &[u8] {
    let start = index * stride;
    &data[start..start + width]
}

/// Whether a run of `width`-byte elements at `stride` can be block copied.
pub fn is_bulk_copyable(width: usize, stride: usize) -> bool {
    stride == width && width % 4 == 0
}

/// Copy `count` consecutive vertices starting at `first` into `dst`.
///
/// `dst` holds `count * words` words where `words` is `width` rounded up.
pub fn pack_run(dst: &mut [u32], data: &[u8], stride: usize, width: usize, first: usize, count: usize) {
    if is_bulk_copyable(width, stride) {
        let src = &data[first * stride..(first + count) * stride];
        bytemuck::cast_slice_mut::<u32, u8>(dst).copy_from_slice(src);
        return;
    }
    let words = width.div_ceil(4);
    for (i, vertex) in dst.chunks_exact_mut(words).take(count).enumerate() {
        pack_vertex(vertex, vertex_bytes(data, stride, width, first + i));
    }
}
