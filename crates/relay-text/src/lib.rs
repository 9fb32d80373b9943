// relay-text: byte/string primitives shared by the evaluator and the
// relay server (dynamic buffer, base codecs, splitting, grapheme and
// screen-width operations, color tokens, escape expansion).

pub mod buf;
pub mod codec;
pub mod color;
pub mod display;
pub mod escape;
pub mod split;

pub use buf::DynBuf;
pub use codec::{base_decode, base_encode, Base, CodecError};
pub use color::{color_code, encode_ansi, strip_colors, COLOR_MARKER};
pub use display::{
    cut, cut_screen, hide, length, length_screen, repeat, reverse, reverse_screen,
};
pub use escape::convert_escaped_chars;
pub use split::{join, split_shell, split_with_options, SplitOptions};
