//! Consistency checks of a canonical operation against a device table.

use std::fmt::Write;

use crate::core::types::{IsiStrategy, Operation};
use crate::core::workload::HaloInfoHwc;
use crate::validation::operation::DpuOperation;
use crate::validation::valid_values::DeviceValidValues;

/// Accumulates human readable findings. Empty means consistent.
#[derive(Debug, Default, Clone)]
pub struct Findings {
    items: Vec<String>,
}

impl Findings {
    fn check(&mut self, ok: bool, describe: impl FnOnce() -> String) {
        if !ok {
            self.items.push(describe());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            let _ = writeln!(out, "{}", item);
        }
        out
    }
}

/// Output extent produced by `input` along one axis, `None` when the kernel does not fit.
pub fn output_dim(input: u32, pad_a: u32, pad_b: u32, kernel: u32, stride: u32) -> Option<u32> {
    if stride == 0 || kernel == 0 {
        return None;
    }
    let padded = input as i64 + pad_a as i64 + pad_b as i64 - kernel as i64;
    if padded < 0 {
        return None;
    }
    Some((padded / stride as i64) as u32 + 1)
}

pub struct WorkloadChecker<'a> {
    table: &'a DeviceValidValues,
}

impl<'a> WorkloadChecker<'a> {
    pub fn new(table: &'a DeviceValidValues) -> Self {
        Self { table }
    }

    pub fn check_workload_consistency(&self, op: &DpuOperation) -> Findings {
        let mut f = Findings::default();
        self.check_device_options(op, &mut f);
        self.check_tensors(op, &mut f);
        self.check_kernel(op, &mut f);
        self.check_sparsity(op, &mut f);
        self.check_halo(op, &mut f);
        self.check_sep(op, &mut f);
        f
    }

    fn check_device_options(&self, op: &DpuOperation, f: &mut Findings) {
        let t = self.table;
        f.check(t.valid_execution_modes.contains(&op.execution_order), || {
            format!("execution mode {:?} not in {:?}", op.execution_order, t.valid_execution_modes)
        });
        for (i, s) in op.input_swizzling.iter().enumerate() {
            f.check(t.valid_swizzlings.contains(s), || format!("input_{} swizzling {:?} not supported", i, s));
        }
        f.check(t.valid_swizzlings.contains(&op.output_swizzling), || {
            format!("output swizzling {:?} not supported", op.output_swizzling)
        });

        let owt = op.output_write_tiles;
        f.check(t.output_write_tile_options.contains(&owt), || {
            format!("output_write_tiles {} not in {:?}", owt, t.output_write_tile_options)
        });
        f.check(op.behaviour.allows_output_write_tiles(owt), || {
            format!("output_write_tiles {} not allowed for {:?}", owt, op.operation)
        });
        f.check(t.isi_strategy_options.contains(&op.isi_strategy), || {
            format!("ISI strategy {:?} not supported", op.isi_strategy)
        });
        if op.isi_strategy == IsiStrategy::SplitOverK {
            f.check(owt > 1, || "SPLIT_OVER_K requires output_write_tiles > 1".to_string());
        }
        if owt > 1 {
            f.check(op.isi_strategy == IsiStrategy::SplitOverK, || {
                format!("output_write_tiles {} requires SPLIT_OVER_K, got {:?}", owt, op.isi_strategy)
            });
        }
    }

    fn check_tensors(&self, op: &DpuOperation, f: &mut Findings) {
        let t = self.table;
        let (input, output) = (&op.input_0, &op.output_0);

        f.check(t.valid_datatypes.contains(&input.dtype), || format!("input datatype {:?} invalid", input.dtype));
        f.check(t.valid_datatypes.contains(&output.dtype), || {
            format!("output datatype {:?} invalid", output.dtype)
        });
        if op.behaviour.has_weights() {
            f.check(t.valid_datatypes.contains(&op.input_1.dtype), || {
                format!("weight datatype {:?} invalid", op.input_1.dtype)
            });
        }
        f.check(t.valid_layouts.contains(&input.layout), || format!("input layout {:?} invalid", input.layout));
        f.check(t.valid_layouts.contains(&output.layout), || format!("output layout {:?} invalid", output.layout));

        let in_range = op.behaviour.input_channels(op.operation, t);
        f.check(in_range.contains(input.channels()), || {
            format!("input channels {} not in {}", input.channels(), in_range.describe())
        });
        let out_range = t.output_channels_range();
        f.check(out_range.contains(output.channels()), || {
            format!("output channels {} not in {}", output.channels(), out_range.describe())
        });
        if op.operation.keeps_channels() {
            f.check(input.channels() == output.channels(), || {
                format!("{:?} needs equal channels, got {} and {}", op.operation, input.channels(), output.channels())
            });
        }

        for (name, dim) in [
            ("input width", input.width()),
            ("input height", input.height()),
            ("output width", output.width()),
            ("output height", output.height()),
        ] {
            f.check(dim >= 1 && dim <= t.spatial_max, || format!("{} {} outside [1, {}]", name, dim, t.spatial_max));
        }
        f.check(input.batches() == output.batches(), || {
            format!("batch mismatch {} vs {}", input.batches(), output.batches())
        });
        f.check(input.batches() == 1, || format!("batch {} not supported", input.batches()));
    }

    fn check_kernel(&self, op: &DpuOperation, f: &mut Findings) {
        let k = &op.kernel;
        let kmax = op.behaviour.kernel_max(self.table);
        let smax = op.behaviour.stride_max(self.table);

        for (name, v) in [("kernel width", k.width), ("kernel height", k.height)] {
            f.check(v >= 1 && v <= kmax, || format!("{} {} outside [1, {}]", name, v, kmax));
        }
        for (name, v, limit) in [
            ("stride width", k.stride_w, op.input_0.width()),
            ("stride height", k.stride_h, op.input_0.height()),
        ] {
            f.check(v >= 1 && v <= smax, || format!("{} {} outside [1, {}]", name, v, smax));
            f.check(v <= limit.max(1), || format!("{} {} larger than input {}", name, v, limit));
        }
        for (name, pad, kernel) in [
            ("top", k.pad_top, k.height),
            ("bottom", k.pad_bottom, k.height),
            ("left", k.pad_left, k.width),
            ("right", k.pad_right, k.width),
        ] {
            f.check(pad <= kernel / 2, || format!("{} padding {} larger than kernel/2 ({})", name, pad, kernel / 2));
        }

        let expected_w = output_dim(op.input_0.width(), k.pad_left, k.pad_right, k.width, k.stride_w);
        f.check(expected_w == Some(op.output_0.width()), || {
            format!("output width {} inconsistent, expected {:?}", op.output_0.width(), expected_w)
        });
        let expected_h = output_dim(op.input_0.height(), k.pad_top, k.pad_bottom, k.height, k.stride_h);
        f.check(expected_h == Some(op.output_0.height()), || {
            format!("output height {} inconsistent, expected {:?}", op.output_0.height(), expected_h)
        });
    }

    fn check_sparsity(&self, op: &DpuOperation, f: &mut Findings) {
        for (name, v) in [("act_sparsity", op.act_sparsity), ("weight_sparsity", op.weight_sparsity)] {
            f.check((0.0..=1.0).contains(&v), || format!("{} {} outside [0, 1]", name, v));
        }

        if op.weight_sparsity_enabled() {
            f.check(op.behaviour.allows_weight_sparsity(), || {
                format!("weight sparsity not supported for {:?}", op.operation)
            });
        } else {
            f.check(op.weight_sparsity == 0.0, || "weight_sparsity set while disabled".to_string());
        }

        if op.act_sparsity_enabled() {
            f.check(op.behaviour.allows_act_sparsity(), || {
                format!("activation sparsity not supported for {:?}", op.operation)
            });
        } else {
            f.check(op.act_sparsity == 0.0, || "act_sparsity set while input is dense".to_string());
        }
    }

    fn check_halo(&self, op: &DpuOperation, f: &mut Findings) {
        let halo = &op.halo;
        let k = &op.kernel;
        let input = &halo.input_0_halo;

        if !self.table.negative_input_halo {
            f.check(input.is_all_positive(), || format!("negative input halo {:?}", input.as_array()));
        }
        for (name, pad, h) in [
            ("top", k.pad_top, input.top),
            ("bottom", k.pad_bottom, input.bottom),
            ("left", k.pad_left, input.left),
            ("right", k.pad_right, input.right),
        ] {
            f.check(pad == 0 || h == 0, || format!("{} edge has both padding {} and halo {}", name, pad, h));
        }

        let outputs: [(&str, &HaloInfoHwc); 3] = [
            ("output halo", &halo.output_0_halo),
            ("output halo broadcast", &halo.output_0_halo_broadcast_cnt),
            ("inbound halo", &halo.output_0_inbound_halo),
        ];
        for (name, h) in outputs {
            f.check(h.is_all_positive(), || format!("negative {} {:?}", name, h.as_array()));
            if !self.table.output_halo {
                f.check(h.is_zero(), || format!("{} not supported on {:?}", name, self.table.device));
            }
        }
    }

    fn check_sep(&self, op: &DpuOperation, f: &mut Findings) {
        if !op.sep.sep_activators {
            return;
        }
        f.check(op.behaviour.allows_sep(), || format!("SEP not supported for {:?}", op.operation));
        f.check(op.sep.storage_elements_pointers[2] == 1, || {
            format!("SEP pointer table needs one channel, got {}", op.sep.storage_elements_pointers[2])
        });
        f.check(op.operation != Operation::CmConvolution, || "SEP with CM_CONVOLUTION".to_string());
    }
}
