//! Test helpers shared by the encode and runner tests.

use crate::config::EncoderConfig;
use std::path::Path;

/// Encoder stand-in run through `sh -c`.
///
/// Prints two status lines (one `\r`-terminated, one `\n`-terminated), then
/// writes the first half of the input to the output. Exits with code 3 when
/// the input file name equals `fail_on`.
pub(crate) fn fake_encoder(fail_on: Option<&str>) -> EncoderConfig {
    fake_encoder_with_prelude(fail_on, "")
}

/// Like [`fake_encoder`], but logs the `current_index` stored in
/// `checkpoint` (an empty line while there is none) to `log` before each
/// encode.
pub(crate) fn fake_encoder_logging_checkpoint(
    fail_on: Option<&str>,
    checkpoint: &Path,
    log: &Path,
) -> EncoderConfig {
    let prelude = format!(
        "grep -o '\"current_index\": *[0-9]*' '{checkpoint}' 2>/dev/null | tr -dc '0-9' >> '{log}'\necho >> '{log}'\n",
        checkpoint = checkpoint.display(),
        log = log.display(),
    );
    fake_encoder_with_prelude(fail_on, &prelude)
}

fn fake_encoder_with_prelude(fail_on: Option<&str>, prelude: &str) -> EncoderConfig {
    let fail_case = match fail_on {
        Some(name) => format!(
            "case \"$in\" in */{name}) echo \"{name}: Invalid data found when processing input\" >&2; exit 3;; esac\n"
        ),
        None => String::new(),
    };

    let script = format!(
        r#"in=""
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then in="$arg"; fi
  prev="$arg"
  out="$arg"
done
{prelude}{fail_case}echo "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from '$in':" >&2
printf 'frame=   10 fps=0.0 q=28.0 size=       0kB time=00:00:01.00 bitrate=   0.0kbits/s speed=2x\r' >&2
printf 'frame=   20 fps=0.0 q=28.0 size=       1kB time=00:00:02.00 bitrate= 128.0kbits/s speed=2x\n' >&2
size=$(wc -c < "$in" | tr -d ' ')
head -c $((size / 2)) "$in" > "$out"
"#
    );

    EncoderConfig {
        program: "sh".to_string(),
        program_args: vec!["-c".to_string(), script, "fake-encoder".to_string()],
        ..EncoderConfig::default()
    }
}
