// Several contexts sharing one GPU.
mod common;

use std::sync::Arc;
use std::thread;

use common::*;
use fimg_core::device::memory::DeviceEvent;
use fimg_core::regs::{self, ColorFormat};
use fimg_core::{AttributeSource, HardwareContext, Primitive, VertexArrays};

#[test]
fn switching_contexts_replays_register_state() {
    let gpu = mock_gpu();
    let mut first = mock_context(&gpu);
    let mut second = mock_context(&gpu);
    second.bind_color_buffer(0x5800_0000, 64, 64, 64, ColorFormat::Argb8888);
    let data = mock_index_vertices(3);
    let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));

    first.draw_arrays(Primitive::Triangles, 0, 3, &arrays).unwrap();
    second.draw_arrays(Primitive::Triangles, 0, 3, &arrays).unwrap();
    with_device(&gpu, |device| {
        assert_eq!(device.register(regs::FGPF_CBADDR), Some(0x5800_0000));
        device.clear_events();
    });

    // Nothing changed in `first`, yet its registers must come back.
    first.draw_arrays(Primitive::Triangles, 0, 3, &arrays).unwrap();
    with_device(&gpu, |device| {
        assert_eq!(device.register(regs::FGPF_CBADDR), Some(COLOR_BUFFER));
        let replay = device.events().iter().any(|event| {
            matches!(event, DeviceEvent::Registers(writes)
                if writes.iter().any(|w| w.register == regs::FGPF_CBADDR && w.value == COLOR_BUFFER))
        });
        assert!(replay);
    });
}

#[test]
fn same_context_does_not_restore_twice() {
    let gpu = mock_gpu();
    let mut ctx = mock_context(&gpu);
    let data = mock_index_vertices(3);
    let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));

    ctx.draw_arrays(Primitive::Triangles, 0, 3, &arrays).unwrap();
    with_device(&gpu, |device| device.clear_events());
    ctx.draw_arrays(Primitive::Triangles, 0, 3, &arrays).unwrap();

    // Clear programs are only uploaded by a restore.
    with_device(&gpu, |device| {
        let clear = regs::instruction_address(regs::FGPS_INSTMEM_START, regs::CLEAR_PROGRAM_BASE);
        assert_eq!(device.memory_writes_in(clear, clear + 1), 0);
    });
}

#[test]
fn contexts_on_threads_serialize_on_the_gpu() {
    let gpu = mock_gpu();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let gpu = Arc::clone(&gpu);
            thread::spawn(move || {
                let config = fimg_core::ContextConfig {
                    lock_timeout_ms: 5_000,
                    ..mock_config()
                };
                let mut ctx = HardwareContext::new(gpu, config).unwrap();
                ctx.bind_color_buffer(COLOR_BUFFER, 32, 32, 32, ColorFormat::Rgb565);
                ctx.set_attribute(0, regs::DataType::UnsignedInt, 1).unwrap();
                let data = mock_index_vertices(300);
                let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&data, 4));
                (0..10)
                    .map(|_| ctx.draw_arrays(Primitive::Points, 0, 300, &arrays).unwrap().batches)
                    .sum::<usize>()
            })
        })
        .collect();

    let batches: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(batches, 40);
    assert_eq!(recorded_draws(&gpu).len(), 40);
    with_device(&gpu, |device| assert_eq!(device.buffer_count(), 0));
}
