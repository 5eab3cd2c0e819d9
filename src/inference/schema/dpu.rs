//! DPU descriptor layouts, one per NN input version.

use serde::{Deserialize, Serialize};

use crate::core::error::VpuError;
use crate::core::tensor::VpuTensor;
use crate::core::types::{
    ActivationFunction, DataType, ExecutionMode, IsiStrategy, Layout, Operation, Swizzling, VpuDevice,
};
use crate::inference::encoder::Encoder;
use crate::inference::schema::{array_fields, Field, OneHotMap, Schema};
use crate::validation::operation::DpuOperation;

/// Input layout a model was trained against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputVersion {
    /// Legacy layout: V10 plus reserved zeros.
    V01,
    V10,
    V11,
    V12,
}

impl InputVersion {
    pub const LATEST: InputVersion = InputVersion::V12;

    pub fn from_number(version: u32) -> Option<Self> {
        match version {
            1 => Some(Self::V01),
            10 => Some(Self::V10),
            11 => Some(Self::V11),
            12 => Some(Self::V12),
            _ => None,
        }
    }

    pub fn number(self) -> u32 {
        match self {
            Self::V01 => 1,
            Self::V10 => 10,
            Self::V11 => 11,
            Self::V12 => 12,
        }
    }

    pub fn width(self) -> usize {
        match self {
            Self::V01 => 71,
            Self::V10 => 67,
            Self::V11 => 93,
            Self::V12 => 96,
        }
    }

    pub fn schema(self) -> Result<Schema<DpuOperation>, VpuError> {
        let (name, fields) = match self {
            Self::V01 => {
                let mut fields = v10_fields();
                fields.push(Field::padding("reserved", 4));
                ("dpu_v01", fields)
            }
            Self::V10 => ("dpu_v10", v10_fields()),
            Self::V11 => ("dpu_v11", v11_fields(false)),
            Self::V12 => ("dpu_v12", v11_fields(true)),
        };
        Schema::register(name, fields)
    }

    pub fn encoder(self) -> Result<Encoder<DpuOperation>, VpuError> {
        Ok(Encoder::new(self.schema()?))
    }
}

type TensorGetter = fn(&DpuOperation) -> &VpuTensor;

fn input_0(op: &DpuOperation) -> &VpuTensor {
    &op.input_0
}

fn input_1(op: &DpuOperation) -> &VpuTensor {
    &op.input_1
}

fn output_0(op: &DpuOperation) -> &VpuTensor {
    &op.output_0
}

fn operation_map() -> OneHotMap {
    OneHotMap::explicit(
        6,
        &[
            (Operation::Convolution, 0),
            (Operation::DwConvolution, 1),
            (Operation::Eltwise, 2),
            (Operation::MaxPool, 3),
            (Operation::AvePool, 4),
            (Operation::CmConvolution, 5),
            (Operation::EltwiseMul, 2),
        ],
    )
}

fn datatype_map() -> OneHotMap {
    OneHotMap::subset(&[DataType::Uint8, DataType::Int8, DataType::Float16, DataType::Bfloat16])
}

fn layout_map() -> OneHotMap {
    OneHotMap::subset(&[Layout::Xyz, Layout::Xzy, Layout::Yxz, Layout::Yzx, Layout::Zxy, Layout::Zyx, Layout::Invalid])
}

fn flag(v: bool) -> f32 {
    if v {
        1.0
    } else {
        0.0
    }
}

fn head_fields() -> Vec<Field<DpuOperation>> {
    vec![
        Field::one_hot("device", OneHotMap::identity::<VpuDevice>(), |o: &DpuOperation| o.device),
        Field::one_hot("operation", operation_map(), |o: &DpuOperation| o.operation),
    ]
}

fn tensor_fields(prefix: &str, get: TensorGetter, full: bool) -> Vec<Field<DpuOperation>> {
    let mut fields = array_fields(&format!("{}.shape", prefix), move |o: &DpuOperation| get(o).shape.map(|v| v as f32));
    fields.push(Field::one_hot(format!("{}.dtype", prefix), datatype_map(), move |o: &DpuOperation| get(o).dtype));
    if full {
        fields.push(Field::one_hot(format!("{}.layout", prefix), layout_map(), move |o: &DpuOperation| {
            get(o).layout
        }));
        fields.push(Field::scalar(format!("{}.sparsity", prefix), move |o: &DpuOperation| flag(get(o).sparsity)));
    }
    fields
}

fn kernel_fields() -> Vec<Field<DpuOperation>> {
    let mut fields = array_fields("kernels", |o: &DpuOperation| [o.kernel.width as f32, o.kernel.height as f32]);
    fields.extend(array_fields("strides", |o: &DpuOperation| [o.kernel.stride_w as f32, o.kernel.stride_h as f32]));
    fields.extend(array_fields("padding", |o: &DpuOperation| {
        let k = &o.kernel;
        [k.pad_top, k.pad_bottom, k.pad_left, k.pad_right].map(|v| v as f32)
    }));
    fields
}

fn sparsity_fields() -> Vec<Field<DpuOperation>> {
    vec![
        Field::scalar("act_sparsity", |o: &DpuOperation| o.act_sparsity),
        Field::scalar("weight_sparsity", |o: &DpuOperation| o.weight_sparsity),
    ]
}

fn swizzling_fields() -> Vec<Field<DpuOperation>> {
    let map = OneHotMap::identity::<Swizzling>;
    vec![
        Field::one_hot("input_0.swizzling", map(), |o: &DpuOperation| o.input_swizzling[0]),
        Field::one_hot("input_1.swizzling", map(), |o: &DpuOperation| o.input_swizzling[1]),
        Field::one_hot("output_0.swizzling", map(), |o: &DpuOperation| o.output_swizzling),
    ]
}

fn v10_fields() -> Vec<Field<DpuOperation>> {
    let mut fields = head_fields();
    fields.extend(tensor_fields("input_0", input_0, false));
    fields.extend(tensor_fields("output_0", output_0, false));
    fields.extend(kernel_fields());
    fields.push(Field::one_hot("execution_order", OneHotMap::identity::<ExecutionMode>(), |o: &DpuOperation| {
        o.execution_order
    }));
    fields.push(Field::one_hot(
        "activation_function",
        OneHotMap::identity::<ActivationFunction>(),
        |o: &DpuOperation| o.activation_function,
    ));
    fields.extend(sparsity_fields());
    fields.extend(swizzling_fields());
    fields.push(Field::scalar("output_write_tiles", |o: &DpuOperation| o.output_write_tiles as f32));
    fields
}

/// V11, or V12 when `halo` is set: swizzlings collapse to flags and halos are appended.
fn v11_fields(halo: bool) -> Vec<Field<DpuOperation>> {
    let mut fields = head_fields();
    fields.extend(tensor_fields("input_0", input_0, true));
    fields.extend(tensor_fields("input_1", input_1, true));
    fields.extend(tensor_fields("output_0", output_0, true));
    fields.extend(kernel_fields());
    fields.push(Field::one_hot(
        "execution_order",
        OneHotMap::subset(&[ExecutionMode::Cuboid16x16, ExecutionMode::Cuboid8x16, ExecutionMode::Cuboid4x16]),
        |o: &DpuOperation| o.execution_order,
    ));
    fields.extend(sparsity_fields());
    if halo {
        fields.extend(array_fields("swizzling_enabled", |o: &DpuOperation| {
            [o.input_swizzling[0], o.input_swizzling[1], o.output_swizzling].map(|s| flag(s != Swizzling::Key0))
        }));
    } else {
        fields.extend(swizzling_fields());
    }
    fields.push(Field::scalar("output_write_tiles", |o: &DpuOperation| o.output_write_tiles as f32));
    fields.push(Field::one_hot("isi_strategy", OneHotMap::identity::<IsiStrategy>(), |o: &DpuOperation| {
        o.isi_strategy
    }));
    if halo {
        fields.extend(array_fields("input_0_halo", |o: &DpuOperation| {
            o.halo.input_0_halo.as_array().map(|v| v as f32)
        }));
        fields.extend(array_fields("output_0_halo", |o: &DpuOperation| {
            o.halo.output_0_halo.as_array().map(|v| v as f32)
        }));
        fields.extend(array_fields("output_0_halo_broadcast_cnt", |o: &DpuOperation| {
            o.halo.output_0_halo_broadcast_cnt.as_array().map(|v| v as f32)
        }));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EnumDomain;
    use crate::core::workload::DpuWorkload;
    use crate::validation::sanitizer::DpuOperationSanitizer;

    fn conv_op() -> DpuOperation {
        let wl = DpuWorkload::new(
            VpuDevice::Vpu27,
            Operation::Convolution,
            VpuTensor::new([16, 16, 64, 1], DataType::Uint8),
            VpuTensor::new([16, 16, 64, 1], DataType::Uint8),
            ExecutionMode::Cuboid16x16,
        )
        .with_kernel([3, 3], [1, 1], [1, 1, 1, 1])
        .with_swizzling([Swizzling::Key5, Swizzling::Key0], Swizzling::Key5);
        DpuOperationSanitizer::default().sanitize(&wl).unwrap()
    }

    #[test]
    fn test_declared_widths() {
        for v in [InputVersion::V01, InputVersion::V10, InputVersion::V11, InputVersion::V12] {
            let schema = v.schema().unwrap();
            assert_eq!(schema.width(), v.width(), "{:?}", v);
        }
    }

    #[test]
    fn test_simulate_matches_written() {
        let op = conv_op();
        for v in [InputVersion::V01, InputVersion::V10, InputVersion::V11, InputVersion::V12] {
            let enc = v.encoder().unwrap();
            let mut buf = vec![0.0; enc.width()];
            assert_eq!(enc.simulate(&op), enc.encode(&op, &mut buf));
        }
    }

    #[test]
    fn test_v10_prefix_layout() {
        let v = InputVersion::V10.encoder().unwrap().encode_vec(&conv_op());
        // device one-hot: Vpu27
        assert_eq!(&v[0..4], &[0.0, 0.0, 1.0, 0.0]);
        // operation one-hot: Convolution
        assert_eq!(&v[4..10], &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(&v[10..14], &[16.0, 16.0, 64.0, 1.0]);
        assert_eq!(v[66], 1.0);
    }

    #[test]
    fn test_v01_ends_with_reserved_zeros() {
        let v = InputVersion::V01.encoder().unwrap().encode_vec(&conv_op());
        assert_eq!(&v[67..], &[0.0; 4]);
    }

    #[test]
    fn test_v12_swizzling_flags() {
        let v = InputVersion::V12.encoder().unwrap().encode_vec(&conv_op());
        // 10 head + 48 tensors + 8 kernel + 3 exec + 2 sparsity
        assert_eq!(&v[71..74], &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_eltwise_mul_shares_eltwise_slot() {
        let map = operation_map();
        assert_eq!(map.position(Operation::EltwiseMul.index()), map.position(Operation::Eltwise.index()));
        assert_eq!(map.position(Operation::LayerNorm.index()), None);
    }

    #[test]
    fn test_version_numbers() {
        assert_eq!(InputVersion::from_number(11), Some(InputVersion::V11));
        assert_eq!(InputVersion::from_number(7), None);
        assert_eq!(InputVersion::from_number(InputVersion::LATEST.number()), Some(InputVersion::V12));
    }
}
