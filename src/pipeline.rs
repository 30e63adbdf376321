
use std::io::{Cursor, Read};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose, Engine as _};
use zip::ZipArchive;

use crate::error::{ClientError, ClientErrorDescription};
use crate::types::{AccentPhrase, AudioQuery};

/// The engine calls the pipelines are built from.
pub trait SpeechService {
    fn audio_query(&mut self, text: &str, speaker: u32, tag: Option<&str>) -> Result<AudioQuery, ClientError>;
    fn accent_phrases(&mut self, text: &str, speaker: u32, tag: Option<&str>) -> Result<Vec<AccentPhrase>, ClientError>;
    fn synthesis(&mut self, query: &AudioQuery, speaker: u32, tag: Option<&str>) -> Result<Vec<u8>, ClientError>;
    fn multi_synthesis(&mut self, queries: &[AudioQuery], speaker: u32, tag: Option<&str>) -> Result<Vec<u8>, ClientError>;
    fn connect_waves(&mut self, waves: &[String], tag: Option<&str>) -> Result<Vec<u8>, ClientError>;
}

/// An audio sink that plays wav data in the background.
pub trait Playback {
    type Handle: PlaybackHandle;

    fn play(&mut self, wav: Vec<u8>) -> Result<Self::Handle, ClientError>;
}

/// One outstanding playback.
pub trait PlaybackHandle {
    /// Blocks until the waveform has been played to the end.
    fn wait(self) -> Result<(), ClientError>;
}

/// Playback that discards audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlayback;

#[derive(Debug)]
pub struct Finished;

impl PlaybackHandle for Finished {
    fn wait(self) -> Result<(), ClientError> {
        Ok(())
    }
}

impl Playback for NoPlayback {
    type Handle = Finished;

    fn play(&mut self, wav: Vec<u8>) -> Result<Finished, ClientError> {
        log::debug!("Playback disabled, dropping {} bytes", wav.len());
        Ok(Finished)
    }
}

#[derive(Debug, Clone)]
pub struct StreamReport {
    pub utterances: usize,
    /// From pipeline start to the return of the last synthesis call.
    pub network_elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub utterances: usize,
    pub network_elapsed: Duration,
    pub waveform: Vec<u8>,
}

/// Synthesizes and plays `texts` one by one, synthesizing line `i` while line `i-1` plays.
///
/// Prosody settings come from one template query fetched for empty text; each
/// line only contributes its accent phrases.
pub fn stream<S, P>(service: &mut S, player: &mut P, texts: &[String], speaker: u32, tag: &str) -> Result<StreamReport, ClientError>
where
    S: SpeechService + ?Sized,
    P: Playback,
{
    let start = Instant::now();
    let mut query = service.audio_query("", speaker, None)?;
    let mut network_elapsed = start.elapsed();
    let mut playing: Option<P::Handle> = None;

    for text in texts {
        query.accent_phrases = service.accent_phrases(text, speaker, Some(tag))?;
        let wav = service.synthesis(&query, speaker, Some(tag))?;
        network_elapsed = start.elapsed();

        if let Some(previous) = playing.take() {
            previous.wait()?;
        }
        playing = Some(player.play(wav)?);
    }

    if let Some(last) = playing {
        last.wait()?;
    }

    Ok(StreamReport {
        utterances: texts.len(),
        network_elapsed,
    })
}

/// Queries every line, synthesizes them in one request and joins the result into one wav.
pub fn synthesize_batch<S>(service: &mut S, texts: &[String], speaker: u32, tag: &str) -> Result<BatchReport, ClientError>
where
    S: SpeechService + ?Sized,
{
    let start = Instant::now();

    let queries = texts
        .iter()
        .map(|text| service.audio_query(text, speaker, Some(tag)))
        .collect::<Result<Vec<_>, _>>()?;

    let archive = service.multi_synthesis(&queries, speaker, Some(tag))?;
    let waves = unpack_archive(&archive)?
        .iter()
        .map(|wav| general_purpose::STANDARD.encode(wav))
        .collect::<Vec<_>>();

    let waveform = service.connect_waves(&waves, Some(tag))?;

    Ok(BatchReport {
        utterances: texts.len(),
        network_elapsed: start.elapsed(),
        waveform,
    })
}

/// [`synthesize_batch`] followed by a single playback of the joined waveform.
pub fn batch<S, P>(service: &mut S, player: &mut P, texts: &[String], speaker: u32, tag: &str) -> Result<BatchReport, ClientError>
where
    S: SpeechService + ?Sized,
    P: Playback,
{
    let report = synthesize_batch(service, texts, speaker, tag)?;
    player.play(report.waveform.clone())?.wait()?;
    Ok(report)
}

/// Archive members in stored order. Directories are skipped; no members at all is an error.
pub fn unpack_archive(archive: &[u8]) -> Result<Vec<Vec<u8>>, ClientError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut members = Vec::with_capacity(zip.len());

    for i in 0..zip.len() {
        let mut member = zip.by_index(i)?;
        if member.is_dir() {
            continue;
        }
        let mut content = Vec::with_capacity(member.size() as usize);
        member
            .read_to_end(&mut content)
            .map_err(|e| ClientError::new(ClientErrorDescription::Archive(zip::result::ZipError::Io(e))))?;
        log::debug!("Unpacked {} ({} bytes)", member.name(), content.len());
        members.push(content);
    }

    if members.is_empty() {
        return Err(ClientError::new(ClientErrorDescription::EmptyArchive));
    }
    Ok(members)
}
