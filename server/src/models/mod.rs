pub mod booking;
pub mod event;
pub mod promo_code;
pub mod seat;
pub mod ticket;
pub mod ticket_type;
pub mod user;
pub mod waitlist;

pub use booking::{Booking, PaymentStatus, TicketLine};
pub use event::{CategoryRef, Event, EventStatus, SectionAssignment, TicketCategory};
pub use promo_code::{DiscountType, PromoCode};
pub use seat::{Seat, SeatStatus};
pub use ticket::{Ticket, TicketStatus};
pub use ticket_type::TicketType;
pub use user::{Role, User};
pub use waitlist::{WaitlistEntry, WaitlistStatus};
