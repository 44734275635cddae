use std::fs;
use std::io::{Cursor, ErrorKind};
use std::iter;
use std::path::Path;

use itertools::Itertools;
use rmp3::{Decoder, Frame};
use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AudioError;

/// Decoded audio, samples interleaved by channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Audio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Audio {
    pub fn num_frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Averages the channels into a single one.
    pub fn to_mono(self) -> Audio {
        if self.channels <= 1 {
            return self;
        }

        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect_vec();

        Audio {
            samples,
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    pub fn resample(self, sample_rate: u32) -> Result<Audio, AudioError> {
        if self.sample_rate == sample_rate {
            return Ok(self);
        }

        let channels = self.channels.max(1) as usize;
        let planar = (0..channels)
            .map(|channel| {
                self.samples
                    .iter()
                    .skip(channel)
                    .step_by(channels)
                    .copied()
                    .collect_vec()
            })
            .collect_vec();

        let resampled = resample(planar, self.sample_rate, sample_rate)?;
        let num_frames = resampled.first().map(Vec::len).unwrap_or(0);
        let samples = (0..num_frames)
            .flat_map(|frame| resampled.iter().map(move |channel| channel[frame]))
            .collect_vec();

        Ok(Audio {
            samples,
            sample_rate,
            channels: self.channels,
        })
    }
}

pub trait Format {
    fn read(bytes: &[u8], path: &Path) -> Result<Audio, AudioError>;
}

pub struct Mp3;

impl Format for Mp3 {
    fn read(bytes: &[u8], path: &Path) -> Result<Audio, AudioError> {
        read_mp3(bytes, path)
    }
}

fn read_mp3(bytes: &[u8], path: &Path) -> Result<Audio, AudioError> {
    let mut decoder = Decoder::new(bytes);

    let (frames, formats): (Vec<_>, Vec<_>) = iter::from_fn(|| loop {
        match decoder.next()? {
            Frame::Audio(audio) => {
                return Some((
                    audio.samples().to_vec(),
                    (audio.sample_rate(), audio.channels()),
                ))
            }
            Frame::Other(_) => continue,
        }
    })
    .unzip();

    let formats = formats.into_iter().unique().collect_vec();

    let (sample_rate, channels) = match formats.as_slice() {
        [format] => *format,
        [] => {
            return Err(AudioError::Decode {
                path: path.to_path_buf(),
                reason: "no audio frames".into(),
            })
        }
        _ => {
            return Err(AudioError::Decode {
                path: path.to_path_buf(),
                reason: "variable sample rate or channel count".into(),
            })
        }
    };

    Ok(Audio {
        samples: frames.into_iter().flatten().collect_vec(),
        sample_rate,
        channels,
    })
}

pub struct Wav;

impl Format for Wav {
    fn read(bytes: &[u8], path: &Path) -> Result<Audio, AudioError> {
        read_wav(bytes, path)
    }
}

fn read_wav(bytes: &[u8], path: &Path) -> Result<Audio, AudioError> {
    let decode_error = |reason: String| AudioError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let mut wav = wavers::Wav::<f32>::new(Box::new(Cursor::new(bytes.to_vec())))
        .map_err(|e| decode_error(e.to_string()))?;
    let sample_rate = wav.sample_rate() as u32;
    let channels = wav.n_channels();
    let samples = wav.read().map_err(|e| decode_error(e.to_string()))?;

    Ok(Audio {
        samples: samples.to_vec(),
        sample_rate,
        channels,
    })
}

pub struct Flac;

impl Format for Flac {
    fn read(bytes: &[u8], path: &Path) -> Result<Audio, AudioError> {
        read_with_symphonia(bytes, path, "flac")
    }
}

fn read_with_symphonia(bytes: &[u8], path: &Path, extension: &str) -> Result<Audio, AudioError> {
    let decode_error = |e: SymphoniaError| AudioError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let stream = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_error)?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AudioError::Decode {
            path: path.to_path_buf(),
            reason: "no default track".into(),
        })?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_error)?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(decode_error(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(path = %path.display(), reason, "skipping corrupt packet");
                continue;
            }
            Err(e) => return Err(decode_error(e)),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count() as u16);

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    match (sample_rate, channels) {
        (Some(sample_rate), Some(channels)) => Ok(Audio {
            samples,
            sample_rate,
            channels,
        }),
        _ => Err(AudioError::Decode {
            path: path.to_path_buf(),
            reason: "missing sample rate or channel layout".into(),
        }),
    }
}

/// Container type from the file's magic bytes, falling back to its extension.
fn detect_format(bytes: &[u8], path: &Path) -> Option<String> {
    infer::get(bytes)
        .map(|kind| kind.extension().to_string())
        .or_else(|| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
        })
}

pub fn read_bytes<F: Format>(bytes: &[u8], path: &Path) -> Result<Audio, AudioError> {
    F::read(bytes, path)
}

pub fn read_audio(path: impl AsRef<Path>) -> Result<Audio, AudioError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| AudioError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match detect_format(&bytes, path).as_deref() {
        Some("wav") => read_bytes::<Wav>(&bytes, path),
        Some("flac") => read_bytes::<Flac>(&bytes, path),
        Some("mp3") => read_bytes::<Mp3>(&bytes, path),
        _ => Err(AudioError::UnsupportedFormat(path.to_path_buf())),
    }
}

pub fn write_wav(path: impl AsRef<Path>, audio: &Audio) -> Result<(), AudioError> {
    let path = path.as_ref();

    wavers::write(
        path,
        &audio.samples,
        audio.sample_rate as i32,
        audio.channels,
    )
    .map_err(|e| AudioError::Encode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

const RESAMPLE_CHUNK: usize = 1024;

/// Resamples planar (one `Vec` per channel) audio with an FFT resampler.
pub fn resample(
    channels: Vec<Vec<f32>>,
    from: u32,
    to: u32,
) -> Result<Vec<Vec<f32>>, AudioError> {
    let num_frames = channels.first().map(Vec::len).unwrap_or(0);
    if from == to || num_frames == 0 {
        return Ok(channels);
    }

    let resample_error = |reason: String| AudioError::Resample { from, to, reason };

    let mut resampler =
        FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, channels.len())
            .map_err(|e| resample_error(e.to_string()))?;

    let mut output = vec![Vec::new(); channels.len()];
    let mut append = |chunk: Vec<Vec<f32>>| {
        for (out, chunk) in output.iter_mut().zip(chunk) {
            out.extend(chunk);
        }
    };

    let mut position = 0;
    while num_frames - position >= resampler.input_frames_next() {
        let end = position + resampler.input_frames_next();
        let chunk = channels.iter().map(|c| &c[position..end]).collect_vec();
        append(
            resampler
                .process(chunk.as_slice(), None)
                .map_err(|e| resample_error(e.to_string()))?,
        );
        position = end;
    }

    if position < num_frames {
        let chunk = channels.iter().map(|c| &c[position..]).collect_vec();
        append(
            resampler
                .process_partial(Some(chunk.as_slice()), None)
                .map_err(|e| resample_error(e.to_string()))?,
        );
    }

    // flush the samples still held back by the resampler's delay
    append(
        resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| resample_error(e.to_string()))?,
    );

    let delay = resampler.output_delay();
    let expected = (num_frames as u64 * to as u64 / from as u64) as usize;

    Ok(output
        .into_iter()
        .map(|channel| channel.into_iter().skip(delay).take(expected).collect_vec())
        .collect_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn downmix_averages_channels() {
        let audio = Audio {
            samples: vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0],
            sample_rate: 8_000,
            channels: 2,
        };

        assert_eq!(audio.to_mono().samples, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn resample_scales_length() {
        let input = sine(48_000, 48_000);

        let output = resample(vec![input], 48_000, 16_000).unwrap();

        assert_eq!(output.len(), 1);
        assert!((output[0].len() as i64 - 16_000).abs() <= 160);
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let input = sine(100, 16_000);

        assert_eq!(
            resample(vec![input.clone()], 16_000, 16_000).unwrap(),
            vec![input]
        );
    }

    #[test]
    fn wav_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let audio = Audio {
            samples: sine(1_600, 16_000),
            sample_rate: 16_000,
            channels: 1,
        };

        write_wav(&path, &audio).unwrap();
        let read = read_audio(&path).unwrap();

        assert_eq!(read.sample_rate, 16_000);
        assert_eq!(read.channels, 1);
        assert_eq!(read.num_frames(), 1_600);
    }

    #[test]
    fn unknown_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "not audio").unwrap();

        assert!(matches!(
            read_audio(&path),
            Err(AudioError::UnsupportedFormat(_))
        ));
    }
}
