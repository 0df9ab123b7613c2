//! Intensity-graded palettes the composer draws from

pub const LOW_INSTRUMENTS: &[&str] = &[
    "Bass Clarinet",
    "Bongos",
    "Cello",
    "Clavichord",
    "Didgeridoo",
    "Dulcimer",
    "Hang Drum",
    "Harp",
    "Kalimba",
    "Koto",
    "Lyre",
    "Marimba",
    "Mbira",
    "Mellotron",
    "Ocarina",
    "Rhodes Piano",
    "Smooth Pianos",
    "Spacey Synths",
    "Synth Pads",
    "Vibraphone",
    "Viola Ensemble",
    "Warm Acoustic Guitar",
    "Woodwinds",
];

pub const MEDIUM_INSTRUMENTS: &[&str] = &[
    "Accordion",
    "Alto Saxophone",
    "Banjo",
    "Boomy Bass",
    "Bouzouki",
    "Buchla Synths",
    "Conga Drums",
    "Fiddle",
    "Glockenspiel",
    "Guitar",
    "Harmonica",
    "Harpsichord",
    "Mandolin",
    "Moog Oscillations",
    "Precision Bass",
    "Ragtime Piano",
    "Sitar",
    "Slide Guitar",
    "Steel Drum",
    "Tabla",
    "Tuba",
];

pub const HIGH_INSTRUMENTS: &[&str] = &[
    "303 Acid Bass",
    "808 Hip Hop Beat",
    "Bagpipes",
    "Dirty Synths",
    "Djembe",
    "Drumline",
    "Flamenco Guitar",
    "Funk Drums",
    "Shamisen",
    "Shredding Guitar",
    "TR-909 Drum Machine",
    "Trumpet",
];

pub const LOW_GENRES: &[&str] = &["Lo-Fi Hip Hop", "Bossa Nova", "Chillout", "Indie Folk"];
pub const MEDIUM_GENRES: &[&str] = &["Classic Rock", "Disco Funk", "Deep House", "Indie Pop"];
pub const HIGH_GENRES: &[&str] = &["EDM", "Drum & Bass", "Techno", "Trap Beat"];

pub const LOW_MOODS: &[&str] = &["Ambient", "Chill", "Lo-fi", "Ethereal Ambience"];
pub const MEDIUM_MOODS: &[&str] = &["Funky", "Upbeat", "Danceable", "Tight Groove"];
pub const HIGH_MOODS: &[&str] = &["Huge Drop", "Crunchy Distortion", "Fat Beats", "Glitchy Effects"];

pub const MAJOR_KEYS: &[&str] = &[
    "C Major", "G Major", "D Major", "A Major", "E Major", "B Major", "F# Major", "C# Major",
    "F Major", "Bb Major", "Eb Major", "Ab Major", "Db Major", "Gb Major", "Cb Major",
];

pub const MINOR_KEYS: &[&str] = &[
    "A Minor", "E Minor", "B Minor", "F# Minor", "C# Minor", "G# Minor", "D# Minor", "A# Minor",
    "D Minor", "G Minor", "C Minor", "F Minor", "Bb Minor", "Eb Minor", "Ab Minor",
];

/// One row of the song template: (id, directive, duration, window, transition)
pub type SectionTemplate = (&'static str, &'static str, u64, u64, Option<&'static str>);

pub const SONG_TEMPLATE: &[SectionTemplate] = &[
    (
        "Intro",
        "Atmospheric pads, filtered kick drum, low energy, deep bass rumble.",
        15_000,
        5_000,
        Some("Slowly opening the filter on the kick drum, introducing hi-hats."),
    ),
    (
        "Verse 1",
        "Full kick drum, crisp hi-hats, minimal chord stabs, steady groove, deep sub-bass.",
        30_000,
        4_000,
        Some("Adding a rising white noise sweeper and snare roll to build tension."),
    ),
    (
        "Build-Up",
        "No bass, snare roll doubling in speed, rising synth pitch, high tension.",
        10_000,
        1_500,
        Some("A sudden silence for one beat, then a massive impact."),
    ),
    (
        "Chorus (Drop)",
        "Maximum energy, heavy bassline, loud clap, complex percussion, main lead melody at full volume.",
        30_000,
        5_000,
        Some("Energy fading out, removing the lead melody, simplifying the drums."),
    ),
    (
        "Interlude",
        "Stripped back groove, just bass and piano, atmospheric vocal chops, spacey reverb.",
        15_000,
        3_000,
        Some("Introducing a new melodic element, a high-pitched synth pluck."),
    ),
    (
        "Solo",
        "Driving beat with a complex, improvised solo, expressive pitch bending.",
        30_000,
        5_000,
        Some("Solo instrument fading into the background, drums becoming sparse."),
    ),
    (
        "Bridge",
        "Breakdown, no drums, washing synth chords, emotional and cinematic texture.",
        15_000,
        4_000,
        Some("Rapidly building snare roll, rising pitch riser, anticipation for the final drop."),
    ),
    (
        "Final Chorus",
        "Explosive energy, all elements playing, euphoric melody, driving rhythm, full frequency spectrum.",
        30_000,
        5_000,
        Some("Instruments dropping out one by one, leaving only the beat."),
    ),
    (
        "Outro",
        "Just the kick drum and atmospheric pads, fading into reverb, music slowing down.",
        15_000,
        0,
        None,
    ),
];
