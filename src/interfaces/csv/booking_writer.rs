use crate::domain::booking::Booking;
use crate::domain::teacher::TeacherSummary;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BookingRow<'a> {
    reference: &'a str,
    student: &'a str,
    teacher: &'a str,
    subject: &'a str,
    level: &'a str,
    requested_time: String,
    duration_minutes: u32,
    end_time: Option<String>,
    price: String,
    status: &'static str,
    rating: Option<u8>,
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    rank: usize,
    teacher: &'a str,
    name: &'a str,
    score: String,
    total_price: Option<String>,
    average_rating: Option<String>,
    subjects: String,
    available_now: Option<bool>,
}

/// Writes bookings and search results as CSV.
pub struct BookingWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BookingWriter<W> {
    pub fn new(destination: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(destination),
        }
    }

    pub fn write_bookings(&mut self, bookings: &[Booking]) -> Result<()> {
        for booking in bookings {
            self.writer.serialize(BookingRow {
                reference: booking.payment_reference.as_deref().unwrap_or(""),
                student: booking.student_id.as_str(),
                teacher: booking.teacher_id.as_str(),
                subject: &booking.subject_id,
                level: &booking.level,
                requested_time: booking.requested_time.to_rfc3339(),
                duration_minutes: booking.duration_minutes,
                end_time: booking.end_time_utc.map(|t| t.to_rfc3339()),
                price: booking.calculated_price.normalize().to_string(),
                status: booking.status.as_str(),
                rating: booking.review.as_ref().map(|r| r.rating),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_summaries(&mut self, teachers: &[TeacherSummary]) -> Result<()> {
        for (index, teacher) in teachers.iter().enumerate() {
            self.writer.serialize(SummaryRow {
                rank: index + 1,
                teacher: teacher.teacher_id.as_str(),
                name: &teacher.display_name,
                score: format!("{:.2}", teacher.score),
                total_price: teacher.total_price.map(|p| p.normalize().to_string()),
                average_rating: teacher.average_rating.map(|r| format!("{r:.1}")),
                subjects: teacher.subjects.join(";"),
                available_now: teacher.available_now,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
