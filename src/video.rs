//! Narration splicing: trims the source video to the narration length and
//! replaces its audio track.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ffmpeg::encoder;
use ffmpeg::util::frame::{audio::Audio, video::Video};
use ffmpeg_next::{
    self as ffmpeg, channel_layout, codec, decoder, filter, format, media, picture, rescale,
    Dictionary, Error as FfmpegError, Packet, Rational, Rescale,
};
use tracing::{debug, info};

use crate::error::{Error, Result};

static INIT: OnceLock<std::result::Result<(), FfmpegError>> = OnceLock::new();

/// Initializes libav once per process.
pub(crate) fn init() -> Result<()> {
    INIT.get_or_init(ffmpeg::init).clone()?;
    Ok(())
}

/// Renders the narrated output video.
pub trait Composer: Send + Sync {
    fn compose(&self, video_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()>;
}

/// `modified_<basename>` inside `output_dir`.
pub fn output_path_for(video_path: &Path, output_dir: &Path) -> PathBuf {
    let basename = video_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.mp4".to_owned());
    output_dir.join(format!("modified_{basename}"))
}

/// Rejects narration that would run past the end of the source video.
pub fn check_trim(video_ms: i64, audio_ms: i64) -> Result<i64> {
    if audio_ms > video_ms {
        return Err(Error::NarrationTooLong {
            audio_secs: audio_ms as f64 / 1000.0,
            video_secs: video_ms as f64 / 1000.0,
        });
    }
    Ok(audio_ms)
}

/// Stream duration converted to milliseconds; `None` when the stream does
/// not declare one.
fn stream_ms(duration: i64, time_base: Rational) -> Option<i64> {
    if duration <= 0 || time_base.numerator() <= 0 || time_base.denominator() <= 0 {
        return None;
    }
    Some(duration.rescale(time_base, (1, 1000)))
}

/// Length of the picture track. The container duration also counts the
/// source audio, which may outlast the frames.
pub(crate) fn video_duration_ms(input: &format::context::Input) -> Result<i64> {
    let declared = input
        .streams()
        .best(media::Type::Video)
        .and_then(|stream| stream_ms(stream.duration(), stream.time_base()));
    match declared {
        Some(ms) => Ok(ms),
        None => duration_ms(input),
    }
}

/// Container duration in milliseconds, falling back to the longest stream.
pub(crate) fn duration_ms(input: &format::context::Input) -> Result<i64> {
    let container = input.duration();
    if container > 0 {
        return Ok(container.rescale(rescale::TIME_BASE, (1, 1000)));
    }
    input
        .streams()
        .filter_map(|stream| stream_ms(stream.duration(), stream.time_base()))
        .max()
        .ok_or_else(|| Error::media("unable to determine media duration"))
}

/// Opens a media file and reports its duration in seconds.
pub fn probe_duration(path: &Path) -> Result<f64> {
    init()?;
    let input = format::input(&path)?;
    Ok(duration_ms(&input)? as f64 / 1000.0)
}

trait Transcoder {
    fn flush_filter_graph(&mut self) -> Result<()> {
        Ok(())
    }

    fn receive_and_process_filtered_frames(
        &mut self,
        _output: &mut format::context::Output,
        _output_stream_time_base: Rational,
    ) -> Result<()> {
        Ok(())
    }

    fn send_packet_to_decoder(&mut self, packet: &Packet) -> Result<()>;

    fn send_eof_to_decoder(&mut self) -> Result<()>;

    fn receive_and_process_decoded_frames(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> Result<()>;

    fn send_eof_to_encoder(&mut self) -> Result<()>;

    fn receive_and_process_encoded_packets(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> Result<()>;

    /// Drains decoder, filter graph and encoder in that order.
    fn finish(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> Result<()> {
        self.send_eof_to_decoder()?;
        self.receive_and_process_decoded_frames(output, output_stream_time_base)?;
        self.flush_filter_graph()?;
        self.receive_and_process_filtered_frames(output, output_stream_time_base)?;
        self.send_eof_to_encoder()?;
        self.receive_and_process_encoded_packets(output, output_stream_time_base)
    }
}

struct VideoTranscoder {
    output_stream_index: usize,
    decoder: decoder::Video,
    encoder: encoder::Video,
    input_time_base: Rational,
    /// Frames at or past this pts are dropped.
    end_pts: i64,
}

impl VideoTranscoder {
    fn new(
        input_stream: &format::stream::Stream,
        output: &mut format::context::Output,
        output_stream_index: usize,
        end_ms: i64,
        preset: &str,
    ) -> Result<Self> {
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);
        let decoder = codec::context::Context::from_parameters(input_stream.parameters())?
            .decoder()
            .video()?;

        let codec = encoder::find(codec::Id::H264).ok_or(FfmpegError::EncoderNotFound)?;
        let mut output_stream = output.add_stream(codec)?;
        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder.set_height(decoder.height());
        encoder.set_width(decoder.width());
        encoder.set_aspect_ratio(decoder.aspect_ratio());
        encoder.set_format(decoder.format());
        encoder.set_frame_rate(decoder.frame_rate());
        encoder.set_time_base(input_stream.time_base());
        output_stream.set_time_base(input_stream.time_base());

        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        opts.set("preset", preset);

        let opened_encoder = encoder.open_with(opts)?;
        output_stream.set_parameters(&opened_encoder);

        Ok(Self {
            output_stream_index,
            decoder,
            encoder: opened_encoder,
            input_time_base: input_stream.time_base(),
            end_pts: end_ms.rescale((1, 1000), input_stream.time_base()),
        })
    }
}

impl Transcoder for VideoTranscoder {
    fn send_packet_to_decoder(&mut self, packet: &Packet) -> Result<()> {
        Ok(self.decoder.send_packet(packet)?)
    }

    fn send_eof_to_decoder(&mut self) -> Result<()> {
        Ok(self.decoder.send_eof()?)
    }

    fn receive_and_process_decoded_frames(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> Result<()> {
        let mut frame = Video::empty();
        while self.decoder.receive_frame(&mut frame).is_ok() {
            let timestamp = frame
                .timestamp()
                .ok_or_else(|| Error::media("decoded video frame has no timestamp"))?;
            if timestamp >= self.end_pts {
                continue;
            }
            frame.set_pts(Some(timestamp));
            frame.set_kind(picture::Type::None);
            self.encoder.send_frame(&frame)?;
            self.receive_and_process_encoded_packets(output, output_stream_time_base)?;
        }
        Ok(())
    }

    fn send_eof_to_encoder(&mut self) -> Result<()> {
        Ok(self.encoder.send_eof()?)
    }

    fn receive_and_process_encoded_packets(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.output_stream_index);
            packet.rescale_ts(self.input_time_base, output_stream_time_base);
            packet.write_interleaved(output)?;
        }
        Ok(())
    }
}

struct AudioTranscoder {
    output_stream_index: usize,
    decoder: decoder::Audio,
    encoder: encoder::Audio,
    filter_graph: filter::Graph,
    encoder_time_base: Rational,
    /// Samples handed to the encoder so far; doubles as the next pts.
    samples_sent: i64,
}

impl AudioTranscoder {
    fn new(
        input_stream: &format::stream::Stream,
        output: &mut format::context::Output,
        output_stream_index: usize,
        filter_spec: &str,
    ) -> Result<Self> {
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);
        let decoder = codec::context::Context::from_parameters(input_stream.parameters())?
            .decoder()
            .audio()?;

        let codec = encoder::find(codec::Id::AAC)
            .ok_or(FfmpegError::EncoderNotFound)?
            .audio()?;
        let mut output_stream = output.add_stream(codec)?;
        let context = codec::context::Context::from_parameters(output_stream.parameters())?;
        let mut encoder = context.encoder().audio()?;

        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let channel_layout = codec
            .channel_layouts()
            .map(|layouts| layouts.best(decoder.channel_layout().channels()))
            .unwrap_or(channel_layout::ChannelLayout::STEREO);
        let encoder_time_base = Rational(1, decoder.rate() as i32);

        encoder.set_channel_layout(channel_layout);
        encoder.set_rate(decoder.rate() as _);
        encoder.set_format(
            codec
                .formats()
                .ok_or_else(|| Error::media("AAC encoder reports no sample formats"))?
                .next()
                .ok_or_else(|| Error::media("AAC encoder reports no sample formats"))?,
        );
        encoder.set_bit_rate(192_000);
        encoder.set_time_base(encoder_time_base);
        output_stream.set_time_base(encoder_time_base);

        let opened_encoder = encoder.open_as(codec)?;
        output_stream.set_parameters(&opened_encoder);

        let filter_graph = Self::filter_graph(
            filter_spec,
            &decoder,
            input_stream.time_base(),
            &opened_encoder,
        )?;

        Ok(Self {
            output_stream_index,
            decoder,
            encoder: opened_encoder,
            filter_graph,
            encoder_time_base,
            samples_sent: 0,
        })
    }

    fn filter_graph(
        spec: &str,
        decoder: &codec::decoder::Audio,
        input_time_base: Rational,
        encoder: &codec::encoder::Audio,
    ) -> Result<filter::Graph> {
        let mut filter_graph = filter::Graph::new();

        let input_layout = if decoder.channel_layout().is_empty() {
            channel_layout::ChannelLayout::default(decoder.channels() as i32)
        } else {
            decoder.channel_layout()
        };
        let args = format!(
            "time_base={}:sample_rate={}:sample_fmt={}:channel_layout=0x{:x}",
            input_time_base,
            decoder.rate(),
            decoder.format().name(),
            input_layout.bits()
        );

        filter_graph.add(
            &filter::find("abuffer").ok_or(FfmpegError::FilterNotFound)?,
            "in",
            &args,
        )?;
        filter_graph.add(
            &filter::find("abuffersink").ok_or(FfmpegError::FilterNotFound)?,
            "out",
            "",
        )?;

        {
            let mut out = filter_graph
                .get("out")
                .ok_or_else(|| Error::media("missing filter `out`"))?;
            out.set_sample_format(encoder.format());
            out.set_channel_layout(encoder.channel_layout());
            out.set_sample_rate(encoder.rate());
        }

        filter_graph.output("in", 0)?.input("out", 0)?.parse(spec)?;
        filter_graph.validate()?;

        debug!(graph = %filter_graph.dump(), "audio filter graph");

        if let Some(codec) = encoder.codec() {
            if !codec
                .capabilities()
                .contains(codec::capabilities::Capabilities::VARIABLE_FRAME_SIZE)
            {
                filter_graph
                    .get("out")
                    .ok_or_else(|| Error::media("missing filter `out`"))?
                    .sink()
                    .set_frame_size(encoder.frame_size());
            }
        }

        Ok(filter_graph)
    }
}

impl Transcoder for AudioTranscoder {
    fn flush_filter_graph(&mut self) -> Result<()> {
        Ok(self
            .filter_graph
            .get("in")
            .ok_or_else(|| Error::media("missing filter `in`"))?
            .source()
            .flush()?)
    }

    fn receive_and_process_filtered_frames(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> Result<()> {
        let mut frame = Audio::empty();
        while self
            .filter_graph
            .get("out")
            .ok_or_else(|| Error::media("missing filter `out`"))?
            .sink()
            .frame(&mut frame)
            .is_ok()
        {
            frame.set_pts(Some(self.samples_sent));
            self.samples_sent += frame.samples() as i64;
            self.encoder.send_frame(&frame)?;
            self.receive_and_process_encoded_packets(output, output_stream_time_base)?;
        }
        Ok(())
    }

    fn send_packet_to_decoder(&mut self, packet: &Packet) -> Result<()> {
        Ok(self.decoder.send_packet(packet)?)
    }

    fn send_eof_to_decoder(&mut self) -> Result<()> {
        Ok(self.decoder.send_eof()?)
    }

    fn receive_and_process_decoded_frames(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> Result<()> {
        let mut frame = Audio::empty();
        while self.decoder.receive_frame(&mut frame).is_ok() {
            let timestamp = frame.timestamp();
            frame.set_pts(timestamp);
            self.filter_graph
                .get("in")
                .ok_or_else(|| Error::media("missing filter `in`"))?
                .source()
                .add(&frame)?;
            self.receive_and_process_filtered_frames(output, output_stream_time_base)?;
        }
        Ok(())
    }

    fn send_eof_to_encoder(&mut self) -> Result<()> {
        Ok(self.encoder.send_eof()?)
    }

    fn receive_and_process_encoded_packets(
        &mut self,
        output: &mut format::context::Output,
        output_stream_time_base: Rational,
    ) -> Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.output_stream_index);
            packet.rescale_ts(self.encoder_time_base, output_stream_time_base);
            packet.write_interleaved(output)?;
        }
        Ok(())
    }
}

/// ffmpeg renderer: H.264 video cut to the narration, AAC narration audio.
#[derive(Debug, Clone)]
pub struct VideoComposer {
    preset: String,
}

impl Default for VideoComposer {
    fn default() -> Self {
        Self {
            preset: "medium".to_owned(),
        }
    }
}

impl VideoComposer {
    pub fn with_preset(preset: impl Into<String>) -> Self {
        Self {
            preset: preset.into(),
        }
    }
}

impl Composer for VideoComposer {
    fn compose(&self, video_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()> {
        init()?;
        let mut video_input = format::input(&video_path)?;
        let mut audio_input = format::input(&audio_path)?;

        let audio_ms = duration_ms(&audio_input)?;
        let end_ms = check_trim(video_duration_ms(&video_input)?, audio_ms)?;
        info!(
            narration_secs = audio_ms as f64 / 1000.0,
            "trimming video to narration"
        );

        let mut output = format::output(&output_path)?;

        let (video_index, mut video_transcoder) = {
            let stream = video_input
                .streams()
                .best(media::Type::Video)
                .ok_or(FfmpegError::StreamNotFound)?;
            let transcoder =
                VideoTranscoder::new(&stream, &mut output, 0, end_ms, &self.preset)?;
            (stream.index(), transcoder)
        };
        let (audio_index, mut audio_transcoder) = {
            let stream = audio_input
                .streams()
                .best(media::Type::Audio)
                .ok_or(FfmpegError::StreamNotFound)?;
            let transcoder = AudioTranscoder::new(&stream, &mut output, 1, "anull")?;
            (stream.index(), transcoder)
        };

        output.set_metadata(video_input.metadata().to_owned());
        output.write_header()?;

        let video_time_base = output
            .stream(0)
            .ok_or(FfmpegError::StreamNotFound)?
            .time_base();
        let audio_time_base = output
            .stream(1)
            .ok_or(FfmpegError::StreamNotFound)?
            .time_base();

        let video_end_pts = video_transcoder.end_pts;
        for (stream, packet) in video_input.packets() {
            if stream.index() != video_index {
                continue;
            }
            if packet.dts().is_some_and(|dts| dts >= video_end_pts) {
                break;
            }
            video_transcoder.send_packet_to_decoder(&packet)?;
            video_transcoder.receive_and_process_decoded_frames(&mut output, video_time_base)?;
        }
        video_transcoder.finish(&mut output, video_time_base)?;

        for (stream, packet) in audio_input.packets() {
            if stream.index() != audio_index {
                continue;
            }
            audio_transcoder.send_packet_to_decoder(&packet)?;
            audio_transcoder.receive_and_process_decoded_frames(&mut output, audio_time_base)?;
        }
        audio_transcoder.finish(&mut output, audio_time_base)?;

        output.write_trailer()?;
        info!(output = %output_path.display(), "render complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_prefixes_basename() {
        let out = output_path_for(Path::new("/videos/talk.mp4"), Path::new("."));
        assert_eq!(out, Path::new("./modified_talk.mp4"));

        let out = output_path_for(Path::new("clip.mov"), Path::new("/tmp/out"));
        assert_eq!(out, Path::new("/tmp/out/modified_clip.mov"));
    }

    #[test]
    fn trim_is_audio_length() {
        assert_eq!(check_trim(30_000, 12_345).unwrap(), 12_345);
        assert_eq!(check_trim(5_000, 5_000).unwrap(), 5_000);
    }

    #[test]
    fn narration_longer_than_video_is_rejected() {
        let err = check_trim(10_000, 10_001).unwrap_err();
        assert!(matches!(err, Error::NarrationTooLong { .. }));
    }

    #[test]
    fn stream_duration_uses_its_own_time_base() {
        assert_eq!(stream_ms(38_400, Rational::new(1, 12_800)), Some(3_000));
        assert_eq!(stream_ms(90, Rational::new(1, 30)), Some(3_000));
        assert_eq!(stream_ms(0, Rational::new(1, 12_800)), None);
        assert_eq!(stream_ms(i64::MIN, Rational::new(1, 12_800)), None);
        assert_eq!(stream_ms(100, Rational::new(0, 1)), None);
    }
}
