// Draw submission tests: batching as the hardware sees it.
mod common;

use common::*;
use fimg_core::device::memory::DeviceEvent;
use fimg_core::host::calculate_batch_size;
use fimg_core::host::scratch::constant_slot_offset;
use fimg_core::regs::{self, BufferControl, DataType};
use fimg_core::{AttributeSource, DrawSummary, Indices, PipelineMask, Primitive, VertexArrays};

#[test]
fn strip_batches_continue_without_discontinuity() {
    let gpu = mock_gpu();
    let mut ctx = mock_context(&gpu);
    let data = mock_index_vertices(2000);
    let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));

    let summary = ctx
        .draw_arrays(Primitive::TriangleStrip, 0, 2000, &arrays)
        .unwrap();
    assert_eq!(summary.batches, 3);
    // The last two vertices only ever close the final batch.
    assert_eq!(summary.vertices_consumed + 2, 2000);

    let draws = recorded_draws(&gpu);
    assert_eq!(draws.len(), 3);
    let batches: Vec<Vec<u32>> = draws.iter().map(varying_words).collect();
    for batch in &batches {
        let n = batch.len();
        assert_eq!(batch[n - 1], batch[n - 2], "trailing vertex is repeated");
        assert_eq!((n - 1) % 2, 0, "batch size is even");
    }
    for pair in batches.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        let n = previous.len();
        assert_eq!(&previous[n - 3..n - 1], &next[..2]);
    }
    assert_eq!(batches[0][0], 0);
    let last = batches.last().unwrap();
    assert_eq!(last[last.len() - 2], 1999);
}

#[test]
fn fan_batches_restart_at_the_center() {
    let gpu = mock_gpu();
    let mut ctx = mock_context(&gpu);
    let data = mock_index_vertices(2000);
    let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));

    let summary = ctx
        .draw_arrays(Primitive::TriangleFan, 0, 2000, &arrays)
        .unwrap();
    assert!(summary.batches > 1);

    let batches: Vec<Vec<u32>> = recorded_draws(&gpu).iter().map(varying_words).collect();
    for batch in &batches {
        assert_eq!(&batch[..3], &[0, 0, 0]);
    }
    for pair in batches.windows(2) {
        assert_eq!(pair[0].last(), pair[1].get(3));
    }
    assert_eq!(batches.last().and_then(|b| b.last()), Some(&1999));
}

#[test]
fn points_conserve_every_vertex() {
    let gpu = mock_gpu();
    let mut ctx = mock_context(&gpu);
    let data = mock_index_vertices(3000);
    let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));

    let summary = ctx.draw_arrays(Primitive::Points, 0, 3000, &arrays).unwrap();
    assert_eq!(
        summary,
        DrawSummary {
            batches: 4,
            vertices_submitted: 3000,
            vertices_consumed: 3000,
        }
    );

    let emitted: Vec<u32> = recorded_draws(&gpu)
        .iter()
        .flat_map(varying_words)
        .collect();
    assert_eq!(emitted, (0..3000).collect::<Vec<u32>>());
}

#[test]
fn triangles_and_lines_conserve_vertices() {
    let gpu = mock_gpu();
    let mut ctx = mock_context(&gpu);
    let data = mock_index_vertices(3000);
    let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));

    for (primitive, count) in [(Primitive::Triangles, 2997), (Primitive::Lines, 2000)] {
        let summary = ctx.draw_arrays(primitive, 0, count, &arrays).unwrap();
        assert_eq!(summary.vertices_consumed, count);
        assert_eq!(summary.vertices_submitted, count);
    }
}

#[test]
fn full_batches_have_the_same_size_regardless_of_input_length() {
    let gpu = mock_gpu();
    let mut ctx = mock_context(&gpu);
    let data = mock_index_vertices(6000);
    let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));

    ctx.draw_arrays(Primitive::Triangles, 0, 3000, &arrays).unwrap();
    let short = recorded_draws(&gpu);
    ctx.draw_arrays(Primitive::Triangles, 0, 6000, &arrays).unwrap();
    let all = recorded_draws(&gpu);

    let full = calculate_batch_size(Primitive::Triangles, 1) as u32;
    assert_eq!(short[0].vertex_count, full);
    assert_eq!(all[short.len()].vertex_count, full);
}

#[test]
fn indexed_uint8_triangle_is_one_batch() {
    let gpu = mock_gpu();
    let mut ctx = mock_context(&gpu);
    let data = mock_index_vertices(3);
    let indices = [2u8, 0, 1];
    let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));

    let summary = ctx
        .draw_elements(Primitive::Triangles, Indices::U8(&indices), &arrays)
        .unwrap();
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.vertices_submitted, 3);

    let draws = recorded_draws(&gpu);
    assert_eq!(draws.len(), 1);
    assert_eq!(varying_words(&draws[0]), vec![2, 0, 1]);
}

#[test]
fn constant_attributes_use_their_reserved_slot() {
    let gpu = mock_gpu();
    let mut ctx = mock_context(&gpu);
    ctx.set_attribute(1, DataType::Float, 4).unwrap();
    let data = mock_index_vertices(3);
    let color: Vec<u8> = [0.25f32, 0.5, 0.75, 1.0]
        .iter()
        .flat_map(|c| c.to_ne_bytes())
        .collect();
    let arrays = VertexArrays::new()
        .with(0, AttributeSource::from_pointer(&data, 4))
        .with(1, AttributeSource::from_pointer(&color, 0));

    ctx.draw_arrays(Primitive::Triangles, 0, 3, &arrays).unwrap();

    let draw = &recorded_draws(&gpu)[0];
    let offset = 4 * constant_slot_offset(1);
    assert_eq!(&draw.vertex_buffer[offset..offset + 16], color.as_slice());
    with_device(&gpu, |device| {
        let control = BufferControl { stride: 0, range: 3 };
        assert_eq!(device.register(regs::fghi_vbctrl(1)), Some(control.to_word()));
        let varying = BufferControl { stride: 4, range: 3 };
        assert_eq!(device.register(regs::fghi_vbctrl(0)), Some(varying.to_word()));
        assert_eq!(device.register(regs::FGVS_ATTRIB_NUM), Some(2));
    });
}

#[test]
fn batches_wait_for_the_host_interface_in_between() {
    let gpu = mock_gpu();
    let mut ctx = mock_context(&gpu);
    let data = mock_index_vertices(3000);
    let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));

    let summary = ctx.draw_arrays(Primitive::Points, 0, 3000, &arrays).unwrap();

    let events = events(&gpu);
    let host_waits = events
        .iter()
        .filter(|event| {
            matches!(event, DeviceEvent::WaitIdle(mask)
                if *mask == PipelineMask::HOST_INTERFACE | PipelineMask::HOST_FIFO)
        })
        .count();
    assert_eq!(host_waits, summary.batches - 1);
    assert!(matches!(events.iter().find(|e| matches!(e, DeviceEvent::WaitIdle(_))),
        Some(DeviceEvent::WaitIdle(mask)) if *mask == PipelineMask::ALL));
}

#[test]
fn too_few_vertices_never_touch_the_device() {
    let gpu = mock_gpu();
    let mut ctx = mock_context(&gpu);
    let data = mock_index_vertices(2);
    let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));

    let summary = ctx.draw_arrays(Primitive::TriangleFan, 0, 2, &arrays).unwrap();
    assert_eq!(summary, DrawSummary::default());
    let summary = ctx.draw_arrays(Primitive::Points, 0, 0, &arrays).unwrap();
    assert_eq!(summary, DrawSummary::default());
    assert!(events(&gpu).is_empty());
}
