//! Wiedergabe-Planung
//!
//! Holt spielbereite Pakete aus den Jitter Buffern und legt sie pro Kanal
//! lueckenlos hintereinander auf eine Ausgabe-Zeitachse. Ein
//! Proportionalregler auf den Fuellstand gleicht Drift zwischen Sender- und
//! Ausgabetakt ueber eine leicht veraenderte Abspielrate aus.

use std::collections::BTreeMap;

use klangbruecke_protocol::{AudioCodec, AudioFormat, AudioPaket};

use crate::jitter_buffer::{JitterBuffer, JitterBufferConfig, JitterBufferStatistik};

// ---------------------------------------------------------------------------
// Ausgabe
// ---------------------------------------------------------------------------

/// Abstrakte Audio-Ausgabe (Geraet oder Test-Senke)
pub trait AudioAusgabe: Send {
    /// Aktuelle Zeit der Ausgabe-Uhr in Sekunden
    fn jetzt(&self) -> f64;

    /// Plant `samples` ab `start` (Sekunden, Ausgabe-Uhr) mit Abspielrate `rate`
    fn planen(&mut self, kanal: u16, samples: &[f32], start: f64, rate: f64);
}

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub format: AudioFormat,
    /// Abstand zu "jetzt" nach einem Unterlauf in Sekunden
    pub neustart_vorlauf: f64,
    /// So weit wird hoechstens im Voraus geplant, in Sekunden
    pub planungshorizont: f64,
    pub jitter: JitterBufferConfig,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            neustart_vorlauf: 0.020,
            planungshorizont: 0.5,
            jitter: JitterBufferConfig::default(),
        }
    }
}

/// Abspielrate abhaengig von der Abweichung vom Ziel-Fuellstand
///
/// Zu voll wird schneller abgespielt, zu leer langsamer.
pub fn wiedergaberate(fuellstand: usize, ziel: usize) -> f64 {
    let abweichung = fuellstand as i64 - ziel as i64;
    match abweichung {
        0 => 1.0,
        1..=2 => 1.002,
        -2..=-1 => 0.998,
        a if a > 0 => 1.01,
        _ => 0.99,
    }
}

// ---------------------------------------------------------------------------
// PlaybackScheduler
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct KanalWiedergabe {
    puffer: JitterBuffer,
    naechste_startzeit: Option<f64>,
    unterlaeufe: u64,
}

pub struct PlaybackScheduler<A: AudioAusgabe> {
    ausgabe: A,
    config: PlaybackConfig,
    codec: Option<Box<dyn AudioCodec>>,
    kanaele: BTreeMap<u16, KanalWiedergabe>,
}

impl<A: AudioAusgabe> std::fmt::Debug for PlaybackScheduler<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("config", &self.config)
            .field("kanaele", &self.kanaele.len())
            .finish()
    }
}

impl<A: AudioAusgabe> PlaybackScheduler<A> {
    pub fn neu(ausgabe: A, config: PlaybackConfig) -> Self {
        Self {
            ausgabe,
            config,
            codec: None,
            kanaele: BTreeMap::new(),
        }
    }

    /// Codec fuer `opus`-Nutzdaten
    pub fn mit_codec(mut self, codec: Box<dyn AudioCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn ausgabe(&self) -> &A {
        &self.ausgabe
    }

    /// Reicht ein empfangenes Paket an den Jitter Buffer seines Kanals
    pub fn paket_empfangen(&mut self, paket: AudioPaket, jetzt_ms: f64) {
        let jitter_config = &self.config.jitter;
        self.kanaele
            .entry(paket.channel)
            .or_insert_with(|| KanalWiedergabe {
                puffer: JitterBuffer::neu(jitter_config.clone()),
                naechste_startzeit: None,
                unterlaeufe: 0,
            })
            .puffer
            .paket_hinzufuegen(paket, jetzt_ms);
    }

    /// Plant alle spielbereiten Pakete bis zum Horizont ein
    ///
    /// Liefert die Anzahl eingeplanter Pakete.
    pub fn planen(&mut self) -> usize {
        let mut geplant = 0;
        for (&kanal, wiedergabe) in self.kanaele.iter_mut() {
            loop {
                let jetzt = self.ausgabe.jetzt();
                let start = startzeit(wiedergabe, jetzt, self.config.neustart_vorlauf);
                if start - jetzt >= self.config.planungshorizont {
                    break;
                }

                let groessen = wiedergabe.puffer.groessen();
                let rate = wiedergaberate(wiedergabe.puffer.fuellstand(), groessen.ziel);
                let Some(paket) = wiedergabe.puffer.naechstes_paket() else {
                    break;
                };
                if ausgeben(
                    &mut self.ausgabe,
                    &mut self.codec,
                    &self.config.format,
                    wiedergabe,
                    kanal,
                    &paket,
                    start,
                    rate,
                ) {
                    geplant += 1;
                }
            }
        }
        geplant
    }

    /// Plant den Rest aller Puffer ohne Horizont ein (Sender weg)
    pub fn ausleeren(&mut self) -> usize {
        let mut geplant = 0;
        for (&kanal, wiedergabe) in self.kanaele.iter_mut() {
            for paket in wiedergabe.puffer.ausleeren() {
                let jetzt = self.ausgabe.jetzt();
                let start = startzeit(wiedergabe, jetzt, self.config.neustart_vorlauf);
                if ausgeben(
                    &mut self.ausgabe,
                    &mut self.codec,
                    &self.config.format,
                    wiedergabe,
                    kanal,
                    &paket,
                    start,
                    1.0,
                ) {
                    geplant += 1;
                }
            }
        }
        geplant
    }

    /// Stoppen oder Verlassen: alle Zeitachsen und Puffer verwerfen
    pub fn stoppen(&mut self) {
        self.kanaele.clear();
    }

    pub fn kanaele(&self) -> Vec<u16> {
        self.kanaele.keys().copied().collect()
    }

    pub fn statistik(&self, kanal: u16) -> Option<JitterBufferStatistik> {
        self.kanaele.get(&kanal).map(|k| k.puffer.statistik())
    }

    pub fn naechste_startzeit(&self, kanal: u16) -> Option<f64> {
        self.kanaele.get(&kanal).and_then(|k| k.naechste_startzeit)
    }

    pub fn unterlaeufe(&self, kanal: u16) -> u64 {
        self.kanaele.get(&kanal).map_or(0, |k| k.unterlaeufe)
    }
}

/// Startzeit des naechsten Pakets, nach Unterlauf knapp hinter "jetzt"
fn startzeit(wiedergabe: &mut KanalWiedergabe, jetzt: f64, vorlauf: f64) -> f64 {
    match wiedergabe.naechste_startzeit {
        Some(start) if start >= jetzt => start,
        Some(_) => {
            wiedergabe.unterlaeufe += 1;
            let start = jetzt + vorlauf;
            wiedergabe.naechste_startzeit = Some(start);
            start
        }
        None => {
            let start = jetzt + vorlauf;
            wiedergabe.naechste_startzeit = Some(start);
            start
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn ausgeben<A: AudioAusgabe>(
    ausgabe: &mut A,
    codec: &mut Option<Box<dyn AudioCodec>>,
    format: &AudioFormat,
    wiedergabe: &mut KanalWiedergabe,
    kanal: u16,
    paket: &AudioPaket,
    start: f64,
    rate: f64,
) -> bool {
    let codec = codec.as_mut().map(|c| c.as_mut() as &mut dyn AudioCodec);
    let samples = match paket.samples_dekodieren(codec) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(channel = kanal, sequence = paket.sequence, fehler = %e, "Paket nicht dekodierbar");
            return false;
        }
    };

    ausgabe.planen(kanal, &samples, start, rate);
    let dauer = format.dauer_sekunden(samples.len()) / rate;
    wiedergabe.naechste_startzeit = Some(start + dauer);
    tracing::trace!(channel = kanal, sequence = paket.sequence, start, rate, "Paket eingeplant");
    true
}
