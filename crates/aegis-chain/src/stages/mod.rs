//! Built-in stages.
//!
//! | Order | Kind                      | Stage                 | May reject |
//! |-------|---------------------------|-----------------------|------------|
//! | 1     | `cors`                    | [`CorsStage`]         | yes        |
//! | 2     | `content_type_options`    | [`HeaderWriterStage`] | no         |
//! | 3     | `frame_options`           | [`HeaderWriterStage`] | no         |
//! | 4     | `xss_protection`          | [`HeaderWriterStage`] | no         |
//! | 5     | `referrer_policy`         | [`HeaderWriterStage`] | no         |
//! | 6     | `content_security_policy` | [`HeaderWriterStage`] | no         |

pub mod cors;
pub mod headers;

pub use cors::CorsStage;
pub use headers::HeaderWriterStage;
