//! Capture-Seite des Senders
//!
//! Der Hardware-Callback schiebt jeden Capture-Puffer ueber
//! [`CaptureEingang::einspeisen`] in eine begrenzte crossbeam-Queue und kehrt
//! sofort zurueck. Ist die Queue voll, wird der Frame verworfen und gezaehlt.
//!
//! Der [`CaptureBatcher`] laeuft im Sende-Task, fasst `batch_faktor` Frames
//! pro Kanal zu einem Paket zusammen und vergibt die Sequenznummer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use klangbruecke_protocol::{AudioCodec, AudioFormat, AudioPaket};

use crate::error::ClientResult;
use crate::sequencer::PaketSequenzer;

// ---------------------------------------------------------------------------
// Capture-Frame
// ---------------------------------------------------------------------------

/// Ein Hardware-Puffer eines Kanals
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFrame {
    pub kanal: u16,
    pub samples: Vec<f32>,
    /// Aufnahmezeitpunkt in Millisekunden seit Unix-Epoche
    pub zeitstempel_ms: u64,
}

// ---------------------------------------------------------------------------
// Producer (Hardware-Callback)
// ---------------------------------------------------------------------------

/// Nicht-blockierender Eingang fuer den Capture-Callback
#[derive(Debug, Clone)]
pub struct CaptureEingang {
    tx: Sender<CaptureFrame>,
    verworfen: Arc<AtomicU64>,
}

/// Erstellt Eingang und Empfaenger der Capture-Queue
pub fn capture_kanal(kapazitaet: usize) -> (CaptureEingang, Receiver<CaptureFrame>) {
    let (tx, rx) = bounded(kapazitaet.max(1));
    let eingang = CaptureEingang {
        tx,
        verworfen: Arc::new(AtomicU64::new(0)),
    };
    (eingang, rx)
}

impl CaptureEingang {
    /// Reiht einen Frame ein, blockiert nie
    ///
    /// Liefert `false`, wenn der Frame nicht angenommen wurde.
    pub fn einspeisen(&self, frame: CaptureFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                let gesamt = self.verworfen.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(
                    channel = frame.kanal,
                    verworfen = gesamt,
                    "Capture-Queue voll, Frame verworfen"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Anzahl wegen voller Queue verworfener Frames
    pub fn verworfen(&self) -> u64 {
        self.verworfen.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Batcher
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct OffenerBatch {
    samples: Vec<f32>,
    erster_zeitstempel: u64,
    frames: u32,
}

/// Fasst Capture-Frames zu Audio-Paketen zusammen
pub struct CaptureBatcher {
    format: AudioFormat,
    sequenzer: PaketSequenzer,
    codec: Option<Box<dyn AudioCodec>>,
    offen: HashMap<u16, OffenerBatch>,
}

impl std::fmt::Debug for CaptureBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBatcher")
            .field("format", &self.format)
            .field("sequenzer", &self.sequenzer)
            .field("codec", &self.codec.as_ref().map(|c| c.kodierung()))
            .field("offene_kanaele", &self.offen.len())
            .finish()
    }
}

impl CaptureBatcher {
    /// Batcher fuer rohe PCM-Pakete
    pub fn neu(format: AudioFormat) -> Self {
        Self {
            format,
            sequenzer: PaketSequenzer::neu(),
            codec: None,
            offen: HashMap::new(),
        }
    }

    /// Batcher, der die Samples vor dem Versand kodiert
    pub fn mit_codec(format: AudioFormat, codec: Box<dyn AudioCodec>) -> Self {
        Self {
            codec: Some(codec),
            ..Self::neu(format)
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Nimmt einen Frame auf, liefert ein Paket sobald der Batch voll ist
    pub fn frame_hinzufuegen(&mut self, frame: CaptureFrame) -> ClientResult<Option<AudioPaket>> {
        let batch = self.offen.entry(frame.kanal).or_default();
        if batch.frames == 0 {
            batch.erster_zeitstempel = frame.zeitstempel_ms;
        }
        batch.samples.extend_from_slice(&frame.samples);
        batch.frames += 1;

        if batch.frames < self.format.batch_faktor.max(1) {
            return Ok(None);
        }

        let batch = self.offen.remove(&frame.kanal).unwrap_or_default();
        self.paket_bauen(frame.kanal, batch).map(Some)
    }

    /// Verarbeitet alle Frames, die gerade in der Queue liegen
    pub fn ausstehende_verarbeiten(
        &mut self,
        rx: &Receiver<CaptureFrame>,
    ) -> ClientResult<Vec<AudioPaket>> {
        let mut pakete = Vec::new();
        for frame in rx.try_iter() {
            if let Some(paket) = self.frame_hinzufuegen(frame)? {
                pakete.push(paket);
            }
        }
        Ok(pakete)
    }

    /// Gibt angefangene Batches als kuerzere Pakete aus (beim Stoppen)
    pub fn rest_ausgeben(&mut self) -> ClientResult<Vec<AudioPaket>> {
        let mut kanaele: Vec<u16> = self.offen.keys().copied().collect();
        kanaele.sort_unstable();

        let mut pakete = Vec::with_capacity(kanaele.len());
        for kanal in kanaele {
            if let Some(batch) = self.offen.remove(&kanal) {
                if batch.frames > 0 {
                    pakete.push(self.paket_bauen(kanal, batch)?);
                }
            }
        }
        Ok(pakete)
    }

    /// Neue Verbindung: Sequenzen ab 1, offene Batches verwerfen
    pub fn zuruecksetzen(&mut self) {
        self.sequenzer.zuruecksetzen();
        self.offen.clear();
    }

    fn paket_bauen(&mut self, kanal: u16, batch: OffenerBatch) -> ClientResult<AudioPaket> {
        let sequenz = self.sequenzer.naechste(kanal);
        let paket = match self.codec.as_mut() {
            Some(codec) => {
                let bytes = codec.kodieren(&batch.samples)?;
                AudioPaket::kodiert(kanal, &bytes, batch.erster_zeitstempel, sequenz)
            }
            None => AudioPaket::pcm(kanal, batch.samples, batch.erster_zeitstempel, sequenz),
        };
        tracing::trace!(channel = kanal, sequence = sequenz, frames = batch.frames, "Paket gebaut");
        Ok(paket.mit_buffer_count(batch.frames))
    }
}
