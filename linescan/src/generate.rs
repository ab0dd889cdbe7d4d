//! Random text for benchmark inputs.
use rand::seq::SliceRandom;
use rand::Rng;
use std::io::{self, Write};
use std::sync::OnceLock;

const PUNCTUATION: [char; 4] = [' ', '-', '.', '_'];

fn alphabet() -> &'static [char] {
    static ALPHABET: OnceLock<Vec<char>> = OnceLock::new();
    ALPHABET.get_or_init(|| {
        ('a'..='z')
            .chain('A'..='Z')
            .chain('0'..='9')
            .chain(PUNCTUATION)
            .collect()
    })
}

/// Builds one line of `width` random letters, digits and ` -._`.
pub fn random_line<R: Rng + ?Sized>(rng: &mut R, width: usize) -> String {
    let alphabet = alphabet();
    (0..width)
        .map(|_| *alphabet.choose(rng).unwrap_or(&' '))
        .collect()
}

/// Writes `count` random lines of `width` characters to `writer`.
pub fn write_random_lines<W, R>(writer: &mut W, rng: &mut R, width: usize, count: usize) -> io::Result<()>
where
    W: Write + ?Sized,
    R: Rng + ?Sized,
{
    for _ in 0..count {
        writeln!(writer, "{}", random_line(rng, width))?;
    }
    writer.flush()
}
