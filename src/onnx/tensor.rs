// tensor.rs - Tensor payload helpers
//
// ONNX tensors carry their elements either in `raw_data` (little-endian)
// or in one of the typed repeated fields. These helpers move between the
// two and read/write float payloads.

use half::f16;

use super::proto::TensorProto;
use super::proto::tensor_proto::DataType;
use crate::error::{Error, Result};

/// Moves typed-field elements into `raw_data`.
/// Returns false for tensors that have no raw representation (strings).
pub fn typed_to_raw(t: &mut TensorProto) -> bool {
    if !t.raw_data.is_empty() {
        return true;
    }
    let mut raw = Vec::new();
    match t.elem_type() {
        DataType::Float | DataType::Complex64 => {
            raw.extend(t.float_data.iter().flat_map(|v| v.to_le_bytes()));
            t.float_data.clear();
        }
        DataType::Double | DataType::Complex128 => {
            raw.extend(t.double_data.iter().flat_map(|v| v.to_le_bytes()));
            t.double_data.clear();
        }
        DataType::Int64 => {
            raw.extend(t.int64_data.iter().flat_map(|v| v.to_le_bytes()));
            t.int64_data.clear();
        }
        DataType::Uint32 => {
            raw.extend(t.uint64_data.iter().flat_map(|&v| (v as u32).to_le_bytes()));
            t.uint64_data.clear();
        }
        DataType::Uint64 => {
            raw.extend(t.uint64_data.iter().flat_map(|v| v.to_le_bytes()));
            t.uint64_data.clear();
        }
        DataType::Int32 => {
            raw.extend(t.int32_data.iter().flat_map(|v| v.to_le_bytes()));
            t.int32_data.clear();
        }
        DataType::Float16 | DataType::Bfloat16 | DataType::Int16 | DataType::Uint16 => {
            raw.extend(t.int32_data.iter().flat_map(|&v| (v as u16).to_le_bytes()));
            t.int32_data.clear();
        }
        DataType::Int8 | DataType::Uint8 | DataType::Bool
        | DataType::Float8e4m3fn | DataType::Float8e4m3fnuz
        | DataType::Float8e5m2 | DataType::Float8e5m2fnuz => {
            raw.extend(t.int32_data.iter().map(|&v| v as u8));
            t.int32_data.clear();
        }
        // Packed 4-bit types and strings stay where they are
        _ => return false,
    }
    t.raw_data = raw;
    true
}

/// Reads the elements of a FLOAT tensor.
pub fn float_values(t: &TensorProto) -> Result<Vec<f32>> {
    if t.elem_type() != DataType::Float {
        return Err(tensor_err(t, format!("expected FLOAT, found {}", t.elem_type().as_str_name())));
    }
    let values: Vec<f32> = if t.raw_data.is_empty() {
        t.float_data.clone()
    } else {
        if t.raw_data.len() % 4 != 0 {
            return Err(tensor_err(t, format!("raw_data length {} is not a multiple of 4", t.raw_data.len())));
        }
        t.raw_data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    };
    check_count(t, values.len())?;
    Ok(values)
}

/// Reads the elements of a FLOAT16 tensor.
pub fn half_values(t: &TensorProto) -> Result<Vec<f16>> {
    if t.elem_type() != DataType::Float16 {
        return Err(tensor_err(t, format!("expected FLOAT16, found {}", t.elem_type().as_str_name())));
    }
    let values: Vec<f16> = if t.raw_data.is_empty() {
        t.int32_data.iter().map(|&v| f16::from_bits(v as u16)).collect()
    } else {
        if t.raw_data.len() % 2 != 0 {
            return Err(tensor_err(t, format!("raw_data length {} is not a multiple of 2", t.raw_data.len())));
        }
        t.raw_data
            .chunks_exact(2)
            .map(|c| f16::from_bits(u16::from_le_bytes([c[0], c[1]])))
            .collect()
    };
    check_count(t, values.len())?;
    Ok(values)
}

/// Replaces a FLOAT tensor's payload with half-precision values, keeping
/// whichever storage field the tensor used before.
pub fn store_half(t: &mut TensorProto, values: &[f16]) {
    let used_raw = !t.raw_data.is_empty();
    t.data_type = DataType::Float16 as i32;
    t.float_data.clear();
    if used_raw {
        t.raw_data = values.iter().flat_map(|v| v.to_bits().to_le_bytes()).collect();
    } else {
        t.int32_data = values.iter().map(|v| v.to_bits() as i32).collect();
    }
}

/// Clamps into the representable half-precision range, then rounds.
/// Tiny magnitudes become `±min_positive`; large finite ones `±max_finite`.
pub fn to_half(v: f32, min_positive: f32, max_finite: f32) -> f16 {
    let clamped = if v > 0.0 && v < min_positive {
        min_positive
    } else if v < 0.0 && v > -min_positive {
        -min_positive
    } else if v.is_finite() && v > max_finite {
        max_finite
    } else if v.is_finite() && v < -max_finite {
        -max_finite
    } else {
        v
    };
    f16::from_f32(clamped)
}

/// The payload must hold exactly the element count `dims` implies.
fn check_count(t: &TensorProto, count: usize) -> Result<()> {
    if count != t.numel() {
        return Err(tensor_err(t, format!("{} elements stored, dims {:?} need {}", count, t.dims, t.numel())));
    }
    Ok(())
}

fn tensor_err(t: &TensorProto, reason: String) -> Error {
    Error::Tensor { tensor: t.name.clone(), reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_tensor(values: &[f32], raw: bool) -> TensorProto {
        let mut t = TensorProto {
            name: "w".into(),
            data_type: DataType::Float as i32,
            dims: vec![values.len() as i64],
            ..Default::default()
        };
        if raw {
            t.raw_data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        } else {
            t.float_data = values.to_vec();
        }
        t
    }

    #[test]
    fn typed_floats_move_to_raw() {
        let mut t = float_tensor(&[1.0, -2.5], false);
        assert!(typed_to_raw(&mut t));
        assert!(t.float_data.is_empty());
        assert_eq!(t.raw_data.len(), 8);
        assert_eq!(float_values(&t).unwrap(), vec![1.0, -2.5]);
    }

    #[test]
    fn strings_have_no_raw_form() {
        let mut t = TensorProto {
            data_type: DataType::String as i32,
            string_data: vec![b"abc".to_vec()],
            ..Default::default()
        };
        assert!(!typed_to_raw(&mut t));
        assert_eq!(t.string_data.len(), 1);
    }

    #[test]
    fn store_half_keeps_storage_kind() {
        let vals = [f16::from_f32(0.5), f16::from_f32(-1.0)];

        let mut raw = float_tensor(&[0.0, 0.0], true);
        store_half(&mut raw, &vals);
        assert_eq!(raw.raw_data.len(), 4);
        assert!(raw.int32_data.is_empty());
        assert_eq!(half_values(&raw).unwrap(), vals.to_vec());

        let mut typed = float_tensor(&[0.0, 0.0], false);
        store_half(&mut typed, &vals);
        assert!(typed.raw_data.is_empty());
        assert_eq!(typed.int32_data.len(), 2);
        assert_eq!(half_values(&typed).unwrap(), vals.to_vec());
    }

    #[test]
    fn payload_must_match_dims() {
        let mut t = float_tensor(&[1.0, 2.0, 3.0], true);
        t.dims = vec![2, 2];
        assert!(matches!(float_values(&t), Err(Error::Tensor { .. })));

        let mut h = float_tensor(&[0.0, 0.0], false);
        store_half(&mut h, &[f16::ONE, f16::ONE]);
        h.dims = vec![3];
        assert!(matches!(half_values(&h), Err(Error::Tensor { .. })));

        let mut scalar = float_tensor(&[4.0], false);
        scalar.dims.clear();
        assert_eq!(float_values(&scalar).unwrap(), vec![4.0]);
    }

    #[test]
    fn to_half_clamps_extremes() {
        assert_eq!(to_half(1e-9, 1e-7, 1e4), f16::from_f32(1e-7));
        assert_eq!(to_half(-1e-9, 1e-7, 1e4), f16::from_f32(-1e-7));
        assert_eq!(to_half(1e6, 1e-7, 1e4), f16::from_f32(1e4));
        assert_eq!(to_half(-1e6, 1e-7, 1e4), f16::from_f32(-1e4));
        assert_eq!(to_half(0.0, 1e-7, 1e4), f16::from_f32(0.0));
        assert!(to_half(f32::INFINITY, 1e-7, 1e4).is_infinite());
        assert!(to_half(f32::NAN, 1e-7, 1e4).is_nan());
    }
}
