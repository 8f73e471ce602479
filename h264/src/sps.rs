use crate::bits::{strip_emulation_prevention, BitReader};

/// Dimensions and profile data extracted from a sequence parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// `profile_idc`.
    pub profile_idc: u8,
    /// The constraint-set flags and reserved bits, packed as one byte.
    pub constraint_flags: u8,
    /// `level_idc`.
    pub level_idc: u8,
    /// Coded picture width in pixels, after cropping.
    pub width: u32,
    /// Coded picture height in pixels, after cropping.
    pub height: u32,
    /// `avc1.<profile><constraints><level>` codec string in lowercase hex,
    /// suitable for a browser's `MediaSource`/`VideoDecoder` configuration.
    pub codec: String,
}

/// Profiles whose SPS carries the chroma/bit-depth extension fields.
fn has_chroma_extension(profile_idc: u8) -> bool {
    matches!(profile_idc, 100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135)
}

/// Parses an SPS NAL payload (header byte included) into its dimensions
/// and profile identity.
///
/// Returns `None` if the payload is too short to contain a usable SPS;
/// this parser only reads the fields needed for dimensions and the
/// codec string, not the full scaling-matrix or VUI structures.
pub fn parse(nal: &[u8]) -> Option<Sps> {
    if nal.len() < 4 {
        return None;
    }
    let profile_idc = nal[1];
    let constraint_flags = nal[2];
    let level_idc = nal[3];

    let rbsp = strip_emulation_prevention(&nal[4..]);
    let mut reader = BitReader::new(&rbsp);

    reader.read_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1u32;
    let mut separate_colour_plane_flag = 0u32;
    if has_chroma_extension(profile_idc) {
        chroma_format_idc = reader.read_ue()?;
        if chroma_format_idc == 3 {
            separate_colour_plane_flag = reader.read_bits(1)?;
        }
        reader.read_ue()?; // bit_depth_luma_minus8
        reader.read_ue()?; // bit_depth_chroma_minus8
        reader.read_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        let scaling_matrix_present = reader.read_bits(1)?;
        if scaling_matrix_present != 0 {
            let count = if chroma_format_idc == 3 { 12 } else { 8 };
            for _ in 0..count {
                let present = reader.read_bits(1)?;
                if present != 0 {
                    skip_scaling_list(&mut reader)?;
                }
            }
        }
    }

    reader.read_ue()?; // log2_max_frame_num_minus4
    let pic_order_cnt_type = reader.read_ue()?;
    if pic_order_cnt_type == 0 {
        reader.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
    } else if pic_order_cnt_type == 1 {
        reader.read_bits(1)?; // delta_pic_order_always_zero_flag
        reader.read_se()?; // offset_for_non_ref_pic
        reader.read_se()?; // offset_for_top_to_bottom_field
        let cycle_len = reader.read_ue()?;
        for _ in 0..cycle_len {
            reader.read_se()?; // offset_for_ref_frame[i]
        }
    }

    reader.read_ue()?; // max_num_ref_frames
    reader.read_bits(1)?; // gaps_in_frame_num_value_allowed_flag
    let pic_width_in_mbs_minus1 = reader.read_ue()?;
    let pic_height_in_map_units_minus1 = reader.read_ue()?;
    let frame_mbs_only_flag = reader.read_bits(1)?;
    if frame_mbs_only_flag == 0 {
        reader.read_bits(1)?; // mb_adaptive_frame_field_flag
    }
    reader.read_bits(1)?; // direct_8x8_inference_flag

    let frame_cropping_flag = reader.read_bits(1)?;
    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0u32, 0u32, 0u32, 0u32);
    if frame_cropping_flag != 0 {
        crop_left = reader.read_ue()?;
        crop_right = reader.read_ue()?;
        crop_top = reader.read_ue()?;
        crop_bottom = reader.read_ue()?;
    }

    let chroma_array_type = if separate_colour_plane_flag != 0 { 0 } else { chroma_format_idc };
    let (sub_width_c, sub_height_c) = match chroma_format_idc {
        1 => (2, 2),
        2 => (2, 1),
        3 => (1, 1),
        _ => (1, 1),
    };
    let crop_unit_x = if chroma_array_type == 0 { 1 } else { sub_width_c };
    let crop_unit_y =
        (2 - frame_mbs_only_flag) * if chroma_array_type == 0 { 1 } else { sub_height_c };

    let width = (pic_width_in_mbs_minus1 + 1) * 16 - crop_unit_x * (crop_left + crop_right);
    let height = (2 - frame_mbs_only_flag) * (pic_height_in_map_units_minus1 + 1) * 16
        - crop_unit_y * (crop_top + crop_bottom);

    let codec = format!("avc1.{profile_idc:02x}{constraint_flags:02x}{level_idc:02x}");

    Some(Sps { profile_idc, constraint_flags, level_idc, width, height, codec })
}

fn skip_scaling_list(reader: &mut BitReader<'_>) -> Option<()> {
    let size = 16; // 4x4; callers needing 8x8 lists would pass a different size
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = reader.read_se()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Baseline profile, 1280x720, progressive, no cropping: profile_idc=66,
    // constraint_flags=0xc0, level_idc=31 (3.1).
    const SPS_1280X720_BASELINE: [u8; 9] =
        [0x67, 0x42, 0xc0, 0x1f, 0xf4, 0x02, 0x80, 0x2d, 0xd0];

    #[test]
    fn parses_1280x720_baseline() {
        let sps = parse(&SPS_1280X720_BASELINE).expect("SPS should parse");
        assert_eq!(sps.profile_idc, 0x42);
        assert_eq!(sps.level_idc, 0x1f);
        assert_eq!(sps.width, 1280);
        assert_eq!(sps.height, 720);
        assert_eq!(sps.codec, "avc1.42c01f");
    }

    #[test]
    fn too_short_payload_returns_none() {
        assert!(parse(&[0x67, 0x42, 0xc0]).is_none());
    }
}
