//! WAV handling for recognition clips.
//!
//! Clips travel as 16 kHz mono 16-bit PCM. Incoming WAV files with another
//! layout are downmixed and resampled on decode.

use crate::defaults::SAMPLE_RATE;
use crate::error::{ChatRelayError, Result};
use std::io::Cursor;
use std::time::Duration;

const BACKEND: &str = "WAV";

/// Length of one clip sent to a recognition backend.
pub const CLIP_DURATION: Duration = Duration::from_secs(5);

/// Encode 16 kHz mono samples as a WAV file in memory.
pub fn encode_wav(samples: &[i16]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;
    Ok(cursor.into_inner())
}

/// Decode WAV bytes into 16 kHz mono samples.
pub fn decode_wav(bytes: &[u8]) -> Result<Vec<i16>> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(wav_error)?;
    let spec = reader.spec();

    let raw: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(wav_error)?;

    let channels = usize::from(spec.channels.max(1));
    let mono: Vec<i16> = if channels == 1 {
        raw
    } else {
        raw.chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect()
    };

    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

/// Split samples into clips of [`CLIP_DURATION`]; the last one may be shorter.
pub fn split_clips(samples: &[i16]) -> impl Iterator<Item = &[i16]> {
    let clip_len = (CLIP_DURATION.as_secs() as usize) * SAMPLE_RATE as usize;
    samples.chunks(clip_len)
}

/// Linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let position = i as f64 * ratio;
            let index = position.floor() as usize;
            let fraction = position - index as f64;
            match (samples.get(index), samples.get(index + 1)) {
                (Some(&left), Some(&right)) => {
                    let (left, right) = (f64::from(left), f64::from(right));
                    (left + (right - left) * fraction) as i16
                }
                (Some(&last), None) => last,
                _ => samples[samples.len() - 1],
            }
        })
        .collect()
}

fn wav_error(e: hound::Error) -> ChatRelayError {
    ChatRelayError::Backend {
        backend: BACKEND,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_encoded_clip_has_expected_header() {
        let bytes = encode_wav(&[1, 2, 3]).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 3);
    }

    #[test]
    fn test_decode_stereo_downmixes_to_mono() {
        let wav = make_wav_data(16000, 2, &[100, 200, 300, 400]);
        assert_eq!(decode_wav(&wav).unwrap(), vec![150, 350]);
    }

    #[test]
    fn test_decode_resamples_to_16khz() {
        let wav = make_wav_data(48000, 1, &vec![1000i16; 48000]);
        let samples = decode_wav(&wav).unwrap();
        assert!((15900..=16100).contains(&samples.len()));
        assert!(samples.iter().all(|&s| (900..=1100).contains(&s)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_wav(b"not a wav file").unwrap_err();
        assert!(err.to_string().starts_with("[WAV]"), "unexpected: {}", err);
    }

    #[test]
    fn test_split_clips_uses_five_second_clips() {
        let samples = vec![0i16; 16000 * 12];
        let lengths: Vec<usize> = split_clips(&samples).map(<[i16]>::len).collect();
        assert_eq!(lengths, vec![80000, 80000, 32000]);
    }
}
