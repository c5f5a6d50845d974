//! WebRTC session layer
//!
//! Architecture:
//! ```text
//! Browser ----- POST /offer ------> WebRtcService ---> SessionManager (one operator)
//!    ^                                    |                 |
//!    |  head / wrist_left / wrist_right   |                 +--> VideoSinks (relays)
//!    +--- RelayTrackSender x3 <-----------+                 |
//!    |                                                      +--> TeleopHandler
//!    +--- DataChannels: hand, pedal, control --------------/
//!         control also carries status text back
//! ```

pub mod channel;
pub mod config;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod track;

pub use channel::{decode_message, ChannelLabel, ChannelMessage, TeleopHandler};
pub use config::{TurnServer, WebRtcConfig};
pub use peer::WebRtcService;
pub use session::{SessionHandle, SessionInfo, SessionManager, SessionTransport, StatusChannel};
pub use signaling::{AnswerResponse, ConnectionState, OfferRequest, SessionState};
pub use track::{camera_track, RelayTrackSender, SampleSink, SenderStats};
