//! DMA descriptor layout. Used for diagnostics; the DMA cost itself is closed-form.

use crate::core::error::VpuError;
use crate::core::tensor::VpuTensor;
use crate::core::types::{DataType, Layout, MemoryLocation, VpuDevice};
use crate::core::workload::DmaWorkload;
use crate::inference::encoder::Encoder;
use crate::inference::schema::{array_fields, Field, OneHotMap, Schema};

pub const DMA_DESCRIPTOR_WIDTH: usize = 67;

fn tensor_fields(prefix: &str, get: fn(&DmaWorkload) -> &VpuTensor) -> Vec<Field<DmaWorkload>> {
    let mut fields = array_fields(&format!("{}.shape", prefix), move |w: &DmaWorkload| get(w).shape.map(|v| v as f32));
    fields.push(Field::one_hot(format!("{}.dtype", prefix), OneHotMap::identity::<DataType>(), move |w: &DmaWorkload| {
        get(w).dtype
    }));
    fields.push(Field::one_hot(format!("{}.layout", prefix), OneHotMap::identity::<Layout>(), move |w: &DmaWorkload| {
        get(w).layout
    }));
    fields
}

fn source(w: &DmaWorkload) -> &VpuTensor {
    &w.input
}

fn destination(w: &DmaWorkload) -> &VpuTensor {
    &w.output
}

pub fn dma_schema() -> Result<Schema<DmaWorkload>, VpuError> {
    let mut fields = vec![Field::one_hot("device", OneHotMap::identity::<VpuDevice>(), |w: &DmaWorkload| w.device)];
    fields.extend(tensor_fields("input", source));
    fields.extend(tensor_fields("output", destination));
    fields.push(Field::one_hot("input_location", OneHotMap::identity::<MemoryLocation>(), |w: &DmaWorkload| {
        w.input_location
    }));
    fields.push(Field::one_hot("output_location", OneHotMap::identity::<MemoryLocation>(), |w: &DmaWorkload| {
        w.output_location
    }));
    fields.push(Field::scalar("output_write_tiles", |w: &DmaWorkload| w.output_write_tiles as f32));
    Schema::register("dma_v01", fields)
}

pub fn dma_encoder() -> Result<Encoder<DmaWorkload>, VpuError> {
    Ok(Encoder::new(dma_schema()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dma_descriptor() {
        let enc = dma_encoder().unwrap();
        assert_eq!(enc.width(), DMA_DESCRIPTOR_WIDTH);

        let wl = DmaWorkload::new(
            VpuDevice::Vpu40,
            VpuTensor::new([56, 56, 16, 1], DataType::Float16),
            VpuTensor::new([56, 56, 16, 1], DataType::Float16),
            MemoryLocation::Dram,
            MemoryLocation::Cmx,
        );
        let v = enc.encode_vec(&wl);
        assert_eq!(enc.simulate(&wl), v.len());
        assert_eq!(&v[0..4], &[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(&v[4..8], &[56.0, 56.0, 16.0, 1.0]);
        // Float16 is the third dtype
        assert_eq!(v[8 + 2], 1.0);
        assert_eq!(v[66], 1.0);
        assert_eq!(v.iter().filter(|&&x| x == 1.0).count(), 1 + 1 + 2 + 2 + 2 + 1 + 1);
    }
}
