//! GeoTIFF reading and writing.
//!
//! Only north-up rasters georeferenced with a single tiepoint and a pixel
//! scale are supported, which is what the imagery service returns. The CRS
//! is carried as an EPSG code in the GeoKey directory and the no-data value
//! in the GDAL_NODATA ASCII tag.
//!
//! Any number of bands is supported. Gray, RGB and RGBA images go through
//! the `tiff` decoder; other band counts are stored as BlackIsZero with
//! extra samples, which that decoder refuses, so their strips are read
//! directly.

use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::ZlibDecoder;
use imagery_common::{Crs, RasterCompression};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::compression::{Compression, Deflate, Lzw, Packbits, Uncompressed};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tiff::{ColorType, TiffError};

use crate::error::{MosaicError, MosaicResult};
use crate::raster::{GeoTransform, Raster, SampleType};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

const PHOTOMETRIC_BLACK_IS_ZERO: u16 = 1;
const PHOTOMETRIC_RGB: u16 = 2;
const EXTRA_SAMPLE_UNSPECIFIED: u16 = 0;
const EXTRA_SAMPLE_UNASSOCIATED_ALPHA: u16 = 2;

const COMPRESSION_NONE: u16 = 1;
const COMPRESSION_LZW: u16 = 5;
const COMPRESSION_DEFLATE: u16 = 8;
const COMPRESSION_OLD_DEFLATE: u16 = 32946;
const COMPRESSION_PACKBITS: u16 = 32773;

const PREDICTOR_NONE: u16 = 1;
const PREDICTOR_HORIZONTAL: u16 = 2;

const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_INT: u16 = 2;
const SAMPLE_FORMAT_FLOAT: u16 = 3;

/// Rows per strip on write.
const ROWS_PER_STRIP: usize = 256;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read a GeoTIFF file.
pub fn read_geotiff(path: impl AsRef<Path>) -> MosaicResult<Raster> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_geotiff(&bytes)
}

/// Decode a GeoTIFF held in memory.
pub fn decode_geotiff(bytes: &[u8]) -> MosaicResult<Raster> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;

    // Full-size mosaics exceed the default buffer limits
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    decoder = decoder.with_limits(limits);

    let (width, height) = decoder.dimensions()?;

    let scale = decoder
        .get_tag_f64_vec(tag(MODEL_PIXEL_SCALE))
        .map_err(|_| MosaicError::InvalidGeoTiff("missing ModelPixelScale".to_string()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(tag(MODEL_TIEPOINT))
        .map_err(|_| MosaicError::InvalidGeoTiff("missing ModelTiepoint".to_string()))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(MosaicError::InvalidGeoTiff(
            "malformed georeferencing tags".to_string(),
        ));
    }

    let geokeys = decoder
        .get_tag_u16_vec(tag(GEO_KEY_DIRECTORY))
        .map_err(|_| MosaicError::InvalidGeoTiff("missing GeoKeyDirectory".to_string()))?;
    let crs = crs_from_geokeys(&geokeys)?;

    let nodata = decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

    // Tiepoint maps raster (i, j) to model (x, y)
    let transform = GeoTransform {
        origin_x: tiepoint[3] - tiepoint[0] * scale[0],
        origin_y: tiepoint[4] + tiepoint[1] * scale[1],
        pixel_width: scale[0],
        pixel_height: scale[1],
    };

    let (bands, sample_type, data) = match decoder.colortype() {
        Ok(ColorType::Gray(_)) => decoded_samples(1, decoder.read_image()?),
        Ok(ColorType::RGB(_)) => decoded_samples(3, decoder.read_image()?),
        Ok(ColorType::RGBA(_)) => decoded_samples(4, decoder.read_image()?),
        Ok(other) => {
            return Err(MosaicError::UnsupportedLayout(format!(
                "color type {:?}",
                other
            )))
        }
        Err(TiffError::UnsupportedError(_)) => {
            let layout = StripLayout::read(&mut decoder, height as usize)?;
            let (sample_type, data) = layout.decode(bytes, width as usize, height as usize)?;
            (layout.bands, sample_type, data)
        }
        Err(e) => return Err(e.into()),
    };

    let raster = Raster::new(
        width as usize,
        height as usize,
        bands,
        sample_type,
        data,
        transform,
        crs,
    )?;
    Ok(match nodata {
        Some(value) => raster.with_nodata(value),
        None => raster,
    })
}

fn decoded_samples(bands: usize, result: DecodingResult) -> (usize, SampleType, Vec<f32>) {
    let (sample_type, data) = match result {
        DecodingResult::U8(data) => (SampleType::U8, data.into_iter().map(f32::from).collect()),
        DecodingResult::U16(data) => (SampleType::U16, data.into_iter().map(f32::from).collect()),
        DecodingResult::F32(data) => (SampleType::F32, data),
        DecodingResult::F64(data) => (SampleType::F32, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I8(data) => (SampleType::F32, data.into_iter().map(f32::from).collect()),
        DecodingResult::I16(data) => (SampleType::F32, data.into_iter().map(f32::from).collect()),
        DecodingResult::U32(data) => (SampleType::F32, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I32(data) => (SampleType::F32, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U64(data) => (SampleType::F32, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I64(data) => (SampleType::F32, data.into_iter().map(|v| v as f32).collect()),
    };
    (bands, sample_type, data)
}

/// Strip layout of an image the `tiff` decoder cannot expand.
#[derive(Debug)]
struct StripLayout {
    bands: usize,
    bits: u16,
    format: u16,
    compression: u16,
    predictor: u16,
    planar: bool,
    rows_per_strip: usize,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

impl StripLayout {
    fn read<R: Read + std::io::Seek>(decoder: &mut Decoder<R>, height: usize) -> MosaicResult<Self> {
        let bands = decoder.find_tag_unsigned::<u16>(Tag::SamplesPerPixel)?.unwrap_or(1) as usize;
        let bits = decoder
            .find_tag_unsigned_vec::<u16>(Tag::BitsPerSample)?
            .unwrap_or_else(|| vec![1]);
        let format = decoder
            .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)?
            .unwrap_or_else(|| vec![SAMPLE_FORMAT_UINT]);
        if bits.iter().any(|&b| b != bits[0]) || format.iter().any(|&f| f != format[0]) {
            return Err(MosaicError::UnsupportedLayout(
                "mixed sample types across bands".to_string(),
            ));
        }
        if decoder.find_tag(Tag::TileOffsets)?.is_some() {
            return Err(MosaicError::UnsupportedLayout(format!(
                "tiled {}-band image",
                bands
            )));
        }

        let rows_per_strip = decoder
            .find_tag_unsigned::<u32>(Tag::RowsPerStrip)?
            .map(|rows| rows as usize)
            .unwrap_or(height)
            .clamp(1, height.max(1));

        let offsets = decoder
            .find_tag_unsigned_vec::<u64>(Tag::StripOffsets)?
            .ok_or_else(|| MosaicError::InvalidGeoTiff("missing StripOffsets".to_string()))?;
        let byte_counts = decoder
            .find_tag_unsigned_vec::<u64>(Tag::StripByteCounts)?
            .ok_or_else(|| MosaicError::InvalidGeoTiff("missing StripByteCounts".to_string()))?;

        Ok(Self {
            bands,
            bits: bits[0],
            format: format[0],
            compression: decoder.find_tag_unsigned::<u16>(Tag::Compression)?.unwrap_or(COMPRESSION_NONE),
            predictor: decoder.find_tag_unsigned::<u16>(Tag::Predictor)?.unwrap_or(PREDICTOR_NONE),
            planar: decoder.find_tag_unsigned::<u16>(Tag::PlanarConfiguration)? == Some(2),
            rows_per_strip,
            offsets,
            byte_counts,
        })
    }

    fn sample_type(&self) -> MosaicResult<SampleType> {
        match (self.format, self.bits) {
            (SAMPLE_FORMAT_UINT, 8) => Ok(SampleType::U8),
            (SAMPLE_FORMAT_UINT, 16) => Ok(SampleType::U16),
            (SAMPLE_FORMAT_UINT | SAMPLE_FORMAT_INT, 8 | 16 | 32) => Ok(SampleType::F32),
            (SAMPLE_FORMAT_FLOAT, 32 | 64) => Ok(SampleType::F32),
            (format, bits) => Err(MosaicError::UnsupportedLayout(format!(
                "sample format {} with {} bits",
                format, bits
            ))),
        }
    }

    /// Expand every strip into row-major, band-interleaved samples.
    fn decode(&self, bytes: &[u8], width: usize, height: usize) -> MosaicResult<(SampleType, Vec<f32>)> {
        let sample_type = self.sample_type()?;
        if self.predictor != PREDICTOR_NONE
            && !(self.predictor == PREDICTOR_HORIZONTAL && self.format != SAMPLE_FORMAT_FLOAT)
        {
            return Err(MosaicError::UnsupportedLayout(format!(
                "predictor {} on sample format {}",
                self.predictor, self.format
            )));
        }

        let little_endian = bytes.starts_with(b"II");
        let sample_bytes = usize::from(self.bits / 8);
        let planes = if self.planar { self.bands } else { 1 };
        let per_pixel = if self.planar { 1 } else { self.bands };
        let strips_per_plane = (height + self.rows_per_strip - 1) / self.rows_per_strip;
        if self.offsets.len() < strips_per_plane * planes || self.byte_counts.len() < self.offsets.len() {
            return Err(MosaicError::InvalidGeoTiff(format!(
                "{} strips for {} rows in {} planes",
                self.offsets.len(),
                height,
                planes
            )));
        }

        let mut data = vec![0.0f32; width * height * self.bands];
        for plane in 0..planes {
            for strip in 0..strips_per_plane {
                let index = plane * strips_per_plane + strip;
                let first_row = strip * self.rows_per_strip;
                let rows = self.rows_per_strip.min(height - first_row);
                let row_len = width * per_pixel;

                let start = usize::try_from(self.offsets[index]).unwrap_or(usize::MAX);
                let end = start.saturating_add(usize::try_from(self.byte_counts[index]).unwrap_or(usize::MAX));
                let raw = bytes.get(start..end).ok_or_else(|| {
                    MosaicError::InvalidGeoTiff(format!("strip {} lies outside the file", index))
                })?;
                let expanded = decompress(self.compression, raw, rows * row_len * sample_bytes)?;
                if expanded.len() < rows * row_len * sample_bytes {
                    return Err(MosaicError::InvalidGeoTiff(format!(
                        "strip {} holds {} bytes, expected {}",
                        index,
                        expanded.len(),
                        rows * row_len * sample_bytes
                    )));
                }

                let mut words: Vec<u64> = expanded[..rows * row_len * sample_bytes]
                    .chunks_exact(sample_bytes)
                    .map(|chunk| read_word(chunk, little_endian))
                    .collect();
                if self.predictor == PREDICTOR_HORIZONTAL {
                    let mask = if self.bits == 64 { u64::MAX } else { (1u64 << self.bits) - 1 };
                    for row in words.chunks_exact_mut(row_len) {
                        for i in per_pixel..row.len() {
                            row[i] = row[i].wrapping_add(row[i - per_pixel]) & mask;
                        }
                    }
                }

                for (i, word) in words.into_iter().enumerate() {
                    let value = word_to_f32(word, self.bits, self.format);
                    let pixel = first_row * width + i / per_pixel;
                    let band = if self.planar { plane } else { i % per_pixel };
                    data[pixel * self.bands + band] = value;
                }
            }
        }
        Ok((sample_type, data))
    }
}

fn read_word(chunk: &[u8], little_endian: bool) -> u64 {
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    if little_endian {
        chunk.iter().rev().fold(0, fold)
    } else {
        chunk.iter().fold(0, fold)
    }
}

fn word_to_f32(word: u64, bits: u16, format: u16) -> f32 {
    match (format, bits) {
        (SAMPLE_FORMAT_FLOAT, 32) => f32::from_bits(word as u32),
        (SAMPLE_FORMAT_FLOAT, _) => f64::from_bits(word) as f32,
        (SAMPLE_FORMAT_INT, _) => {
            let shift = 64 - u32::from(bits);
            (((word << shift) as i64) >> shift) as f32
        }
        _ => word as f32,
    }
}

fn decompress(method: u16, raw: &[u8], expected: usize) -> MosaicResult<Vec<u8>> {
    match method {
        COMPRESSION_NONE => Ok(raw.to_vec()),
        COMPRESSION_LZW => weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .decode(raw)
            .map_err(|e| MosaicError::InvalidGeoTiff(format!("LZW strip: {:?}", e))),
        COMPRESSION_DEFLATE | COMPRESSION_OLD_DEFLATE => {
            let mut out = Vec::with_capacity(expected);
            ZlibDecoder::new(raw).read_to_end(&mut out)?;
            Ok(out)
        }
        COMPRESSION_PACKBITS => Ok(unpack_bits(raw, expected)),
        other => Err(MosaicError::UnsupportedLayout(format!("compression {}", other))),
    }
}

fn unpack_bits(raw: &[u8], expected: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(expected);
    let mut i = 0;
    while i < raw.len() {
        let header = raw[i] as i8;
        i += 1;
        if header >= 0 {
            let end = (i + header as usize + 1).min(raw.len());
            out.extend_from_slice(&raw[i..end]);
            i = end;
        } else if header != -128 {
            if let Some(&byte) = raw.get(i) {
                let run = (1 - i16::from(header)) as usize;
                out.extend(std::iter::repeat(byte).take(run));
                i += 1;
            }
        }
    }
    out
}

fn crs_from_geokeys(keys: &[u16]) -> MosaicResult<Crs> {
    if keys.len() < 4 {
        return Err(MosaicError::InvalidGeoTiff("truncated GeoKeyDirectory".to_string()));
    }
    let count = keys[3] as usize;
    keys[4..]
        .chunks_exact(4)
        .take(count)
        .find(|entry| {
            (entry[0] == PROJECTED_CS_TYPE_KEY || entry[0] == GEOGRAPHIC_TYPE_KEY) && entry[1] == 0
        })
        .map(|entry| Crs::from_epsg(entry[3]))
        .ok_or_else(|| MosaicError::InvalidGeoTiff("no EPSG code in GeoKeyDirectory".to_string()))
}

fn geokeys_for(crs: Crs) -> Vec<u16> {
    let (model, crs_key) = if crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_KEY)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_KEY)
    };
    vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE_KEY, 0, 1, model,
        GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, crs.epsg(),
    ]
}

/// Write a raster as a GeoTIFF file. `None` writes uncompressed.
pub fn write_geotiff(
    path: impl AsRef<Path>,
    raster: &Raster,
    compression: Option<RasterCompression>,
) -> MosaicResult<()> {
    let bytes = encode_geotiff(raster, compression)?;
    std::fs::write(path.as_ref(), bytes)?;
    Ok(())
}

/// Encode a raster as GeoTIFF bytes.
pub fn encode_geotiff(raster: &Raster, compression: Option<RasterCompression>) -> MosaicResult<Vec<u8>> {
    match compression {
        None => encode_with(raster, Uncompressed),
        Some(RasterCompression::Deflate) => encode_with(raster, Deflate::default()),
        Some(RasterCompression::Lzw) => encode_with(raster, Lzw),
        Some(RasterCompression::Packbits) => encode_with(raster, Packbits),
    }
}

/// Samples in native byte order, matching the header `TiffEncoder` writes.
fn sample_bytes(raster: &Raster) -> (u16, u16, Vec<u8>) {
    match raster.sample_type {
        SampleType::U8 => (
            8,
            SAMPLE_FORMAT_UINT,
            raster.data.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect(),
        ),
        SampleType::U16 => (
            16,
            SAMPLE_FORMAT_UINT,
            raster
                .data
                .iter()
                .flat_map(|v| (v.round().clamp(0.0, 65535.0) as u16).to_ne_bytes())
                .collect(),
        ),
        SampleType::F32 => (
            32,
            SAMPLE_FORMAT_FLOAT,
            raster.data.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        ),
    }
}

fn too_large(what: &str) -> MosaicError {
    MosaicError::UnsupportedLayout(format!("{} exceeds the classic TIFF limit", what))
}

fn encode_with<D: Compression>(raster: &Raster, mut compression: D) -> MosaicResult<Vec<u8>> {
    let (bits, format, bytes) = sample_bytes(raster);
    let bands = u16::try_from(raster.bands).map_err(|_| too_large("band count"))?;
    let width = u32::try_from(raster.width).map_err(|_| too_large("width"))?;
    let height = u32::try_from(raster.height).map_err(|_| too_large("height"))?;
    let strip_len = raster.width * raster.bands * usize::from(bits / 8) * ROWS_PER_STRIP;

    let (photometric, extra_samples) = match raster.bands {
        3 => (PHOTOMETRIC_RGB, Vec::new()),
        4 => (PHOTOMETRIC_RGB, vec![EXTRA_SAMPLE_UNASSOCIATED_ALPHA]),
        n => (PHOTOMETRIC_BLACK_IS_ZERO, vec![EXTRA_SAMPLE_UNSPECIFIED; n - 1]),
    };

    let t = &raster.transform;
    let scale = [t.pixel_width, t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    let geokeys = geokeys_for(raster.crs);

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor)?;
        let mut dir = encoder.new_directory()?;

        let mut offsets = Vec::new();
        let mut byte_counts = Vec::new();
        for strip in bytes.chunks(strip_len.max(1)) {
            let mut packed = Vec::new();
            compression.write_to(&mut packed, strip)?;
            let offset = dir.write_data(&packed[..])?;
            offsets.push(u32::try_from(offset).map_err(|_| too_large("strip offset"))?);
            byte_counts.push(u32::try_from(packed.len()).map_err(|_| too_large("strip size"))?);
        }

        dir.write_tag(Tag::ImageWidth, width)?;
        dir.write_tag(Tag::ImageLength, height)?;
        dir.write_tag(Tag::BitsPerSample, &vec![bits; raster.bands][..])?;
        dir.write_tag(Tag::Compression, D::COMPRESSION_METHOD.to_u16())?;
        dir.write_tag(Tag::PhotometricInterpretation, photometric)?;
        dir.write_tag(Tag::StripOffsets, &offsets[..])?;
        dir.write_tag(Tag::SamplesPerPixel, bands)?;
        dir.write_tag(Tag::RowsPerStrip, ROWS_PER_STRIP.min(raster.height) as u32)?;
        dir.write_tag(Tag::StripByteCounts, &byte_counts[..])?;
        dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
        if !extra_samples.is_empty() {
            dir.write_tag(Tag::ExtraSamples, &extra_samples[..])?;
        }
        dir.write_tag(Tag::SampleFormat, &vec![format; raster.bands][..])?;
        dir.write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
        dir.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
        dir.write_tag(tag(GEO_KEY_DIRECTORY), &geokeys[..])?;
        if let Some(nodata) = raster.nodata {
            dir.write_tag(tag(GDAL_NODATA), nodata.to_string().as_str())?;
        }
        dir.finish()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagery_common::BoundingBox;

    fn sample(bands: usize, sample_type: SampleType) -> Raster {
        let bounds = BoundingBox::new(500_000.0, 7_677_000.0, 500_030.0, 7_677_020.0, Crs::from_epsg(32622));
        let data = (0..3 * 2 * bands).map(|v| (v % 200) as f32).collect();
        Raster::new(3, 2, bands, sample_type, data, GeoTransform::from_bounds(&bounds, 3, 2), bounds.crs).unwrap()
    }

    #[test]
    fn test_georeferencing_survives_encoding() {
        let raster = sample(4, SampleType::U8).with_nodata(0.0);
        let decoded = decode_geotiff(&encode_geotiff(&raster, None).unwrap()).unwrap();
        assert_eq!(decoded.crs, Crs::from_epsg(32622));
        assert_eq!(decoded.bounds().to_array(), raster.bounds().to_array());
        assert_eq!(decoded.nodata, Some(0.0));
        assert_eq!(decoded.bands, 4);
        assert_eq!(decoded.data, raster.data);
    }

    #[test]
    fn test_every_compression_decodes() {
        let raster = sample(3, SampleType::U16);
        for compression in [
            Some(RasterCompression::Deflate),
            Some(RasterCompression::Lzw),
            Some(RasterCompression::Packbits),
        ] {
            let decoded = decode_geotiff(&encode_geotiff(&raster, compression).unwrap()).unwrap();
            assert_eq!(decoded.sample_type, SampleType::U16);
            assert_eq!(decoded.data, raster.data, "{:?}", compression);
        }
    }

    #[test]
    fn test_float_rasters_and_geographic_crs() {
        let bounds = BoundingBox::new(-51.13, 69.204, -51.06, 69.225, Crs::Wgs84);
        let raster = Raster::new(
            2,
            2,
            1,
            SampleType::F32,
            vec![0.25, -1.5, 3.0, 1e6],
            GeoTransform::from_bounds(&bounds, 2, 2),
            Crs::Wgs84,
        )
        .unwrap();
        let decoded = decode_geotiff(&encode_geotiff(&raster, None).unwrap()).unwrap();
        assert_eq!(decoded.crs, Crs::Wgs84);
        assert_eq!(decoded.sample_type, SampleType::F32);
        assert_eq!(decoded.data, raster.data);
    }

    #[test]
    fn test_plain_tiff_is_rejected() {
        let mut cursor = Cursor::new(Vec::new());
        TiffEncoder::new(&mut cursor)
            .unwrap()
            .write_image::<tiff::encoder::colortype::Gray8>(2, 2, &[1, 2, 3, 4])
            .unwrap();
        let err = decode_geotiff(cursor.get_ref()).unwrap_err();
        assert!(matches!(err, MosaicError::InvalidGeoTiff(_)));
    }

    #[test]
    fn test_any_band_count_survives_encoding() {
        for bands in [2, 5, 12] {
            for sample_type in [SampleType::U8, SampleType::U16, SampleType::F32] {
                for compression in [
                    None,
                    Some(RasterCompression::Deflate),
                    Some(RasterCompression::Lzw),
                    Some(RasterCompression::Packbits),
                ] {
                    let raster = sample(bands, sample_type).with_nodata(0.0);
                    let decoded = decode_geotiff(&encode_geotiff(&raster, compression).unwrap()).unwrap();
                    assert_eq!(decoded.bands, bands);
                    assert_eq!(decoded.sample_type, sample_type);
                    assert_eq!(decoded.data, raster.data, "{} bands {:?}", bands, compression);
                    assert_eq!(decoded.bounds().to_array(), raster.bounds().to_array());
                }
            }
        }
    }

    #[test]
    fn test_tall_multiband_raster_spans_several_strips() {
        let bounds = BoundingBox::new(0.0, 0.0, 2.0, 600.0, Crs::from_epsg(32633));
        let data: Vec<f32> = (0..2 * 600 * 2).map(|v| (v % 251) as f32).collect();
        let raster =
            Raster::new(2, 600, 2, SampleType::U8, data, GeoTransform::from_bounds(&bounds, 2, 600), bounds.crs).unwrap();
        let decoded = decode_geotiff(&encode_geotiff(&raster, Some(RasterCompression::Deflate)).unwrap()).unwrap();
        assert_eq!(decoded.data, raster.data);
    }

    /// Two-band image written tag by tag, as other GeoTIFF producers do.
    fn two_band_tiff(samples: &[u8], planar: bool, predictor: u16) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
            let mut dir = encoder.new_directory().unwrap();
            let offset = dir.write_data(samples).unwrap() as u32;
            dir.write_tag(Tag::ImageWidth, 3u32).unwrap();
            dir.write_tag(Tag::ImageLength, 2u32).unwrap();
            dir.write_tag(Tag::BitsPerSample, &[8u16, 8][..]).unwrap();
            dir.write_tag(Tag::Compression, COMPRESSION_NONE).unwrap();
            dir.write_tag(Tag::PhotometricInterpretation, PHOTOMETRIC_BLACK_IS_ZERO).unwrap();
            dir.write_tag(Tag::SamplesPerPixel, 2u16).unwrap();
            dir.write_tag(Tag::ExtraSamples, &[EXTRA_SAMPLE_UNSPECIFIED][..]).unwrap();
            dir.write_tag(Tag::Predictor, predictor).unwrap();
            if planar {
                dir.write_tag(Tag::PlanarConfiguration, 2u16).unwrap();
                dir.write_tag(Tag::RowsPerStrip, 2u32).unwrap();
                dir.write_tag(Tag::StripOffsets, &[offset, offset + 6][..]).unwrap();
                dir.write_tag(Tag::StripByteCounts, &[6u32, 6][..]).unwrap();
            } else {
                dir.write_tag(Tag::PlanarConfiguration, 1u16).unwrap();
                dir.write_tag(Tag::RowsPerStrip, 1u32).unwrap();
                dir.write_tag(Tag::StripOffsets, &[offset, offset + 6][..]).unwrap();
                dir.write_tag(Tag::StripByteCounts, &[6u32, 6][..]).unwrap();
            }
            dir.write_tag(tag(MODEL_PIXEL_SCALE), &[10.0, 10.0, 0.0][..]).unwrap();
            dir.write_tag(tag(MODEL_TIEPOINT), &[0.0, 0.0, 0.0, 500_000.0, 7_677_020.0, 0.0][..])
                .unwrap();
            dir.write_tag(tag(GEO_KEY_DIRECTORY), &geokeys_for(Crs::from_epsg(32622))[..])
                .unwrap();
            dir.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_foreign_two_band_image_decodes() {
        let chunky = two_band_tiff(&[1, 101, 2, 102, 3, 103, 4, 104, 5, 105, 6, 106], false, PREDICTOR_NONE);
        let decoded = decode_geotiff(&chunky).unwrap();
        assert_eq!(decoded.bands, 2);
        assert_eq!(decoded.sample_type, SampleType::U8);
        assert_eq!(decoded.pixel(2, 1), &[6.0, 106.0]);
        assert_eq!(decoded.transform.origin_x, 500_000.0);

        let planar = two_band_tiff(&[1, 2, 3, 4, 5, 6, 101, 102, 103, 104, 105, 106], true, PREDICTOR_NONE);
        assert_eq!(decode_geotiff(&planar).unwrap().data, decoded.data);
    }

    #[test]
    fn test_horizontal_predictor_is_undone() {
        // Deltas against the previous pixel of the same band, per row
        let differenced = two_band_tiff(&[1, 101, 1, 1, 1, 1, 4, 104, 1, 1, 1, 1], false, PREDICTOR_HORIZONTAL);
        let decoded = decode_geotiff(&differenced).unwrap();
        assert_eq!(
            decoded.data,
            vec![1.0, 101.0, 2.0, 102.0, 3.0, 103.0, 4.0, 104.0, 5.0, 105.0, 6.0, 106.0]
        );
    }

    #[test]
    fn test_packbits_runs_and_literals() {
        assert_eq!(unpack_bits(&[0xFE, 7, 0x01, 1, 2], 5), vec![7, 7, 7, 1, 2]);
        // -128 is a no-op header
        assert_eq!(unpack_bits(&[0x80, 0x00, 9], 1), vec![9]);
    }
}
